use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{LlmConfig, LlmProviderKind};
use crate::provider_gemini::GeminiProvider;
use crate::provider_lmstudio::LmStudioProvider;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ProviderInfo {
    pub name: String,
    pub base_url: String,
    pub model: String,
}

/// Stateless text completion. All conversation context travels in `prompt`.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String>;
    async fn ping(&self) -> anyhow::Result<()>;
    fn info(&self) -> ProviderInfo;
}

pub fn from_config(cfg: &LlmConfig) -> anyhow::Result<Arc<dyn LanguageModel>> {
    Ok(match cfg.provider {
        LlmProviderKind::Gemini => {
            let key = cfg
                .api_key
                .clone()
                .ok_or_else(|| anyhow::anyhow!("GEMINI_API_KEY is not set"))?;
            Arc::new(GeminiProvider::new(cfg.base_url.clone(), key, cfg.model.clone()))
        }
        LlmProviderKind::LmStudio => Arc::new(LmStudioProvider::new(
            cfg.base_url.clone().unwrap_or_else(|| "http://127.0.0.1:1234".to_string()),
            cfg.model.clone(),
        )),
    })
}
