use std::sync::Arc;

use crate::pipeline::AnalyticsPipeline;
use crate::provider::ProviderInfo;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub pipeline: AnalyticsPipeline,
    pub provider: ProviderInfo,
}

impl AppState {
    pub fn new(pipeline: AnalyticsPipeline, provider: ProviderInfo) -> Self {
        Self { pipeline, provider }
    }
}
