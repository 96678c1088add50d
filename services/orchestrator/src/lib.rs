//! Conversational analytics over tenant-uploaded datasets.
//!
//! [`AnalyticsPipeline`] is the entry point: upload and manage datasets,
//! read KPIs off the active one, and run chat turns through
//! [`MessageOrchestrator`]. The axum surface in [`routes`] is a thin layer
//! over it.

pub mod analytics;
mod blocking;
pub mod classify;
pub mod config;
pub mod error;
pub mod ingest;
pub mod orchestrator;
pub mod pipeline;
pub mod prompt;
pub mod provider;
mod provider_gemini;
mod provider_lmstudio;
pub mod routes;
mod routes_chat;
mod routes_datasets;
mod routes_history;
pub mod state;
pub mod tenant;
pub mod troubleshooting;

pub use config::{AppConfig, PipelineConfig};
pub use error::{PipelineError, ASSISTANT_UNAVAILABLE};
pub use orchestrator::{ChatReply, MessageOrchestrator};
pub use pipeline::{ActiveKpis, AnalyticsPipeline, DatasetDetail, DeleteReport, Upload};
pub use provider::{LanguageModel, ProviderInfo};
pub use state::{AppState, SharedState};
