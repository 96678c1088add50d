use anyhow::{bail, Context};
use async_trait::async_trait;
use serde_json::Value;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Google Generative Language `generateContent`.
pub struct GeminiProvider {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(base_url: Option<String>, api_key: String, model: String) -> Self {
        let base_url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            client: reqwest::Client::new(),
        }
    }

    fn model_url(&self) -> String {
        format!("{}/v1beta/models/{}", self.base_url, self.model)
    }
}

/// Concatenated text parts of the first candidate.
fn candidate_text(json: &Value) -> Option<String> {
    let parts = json["candidates"][0]["content"]["parts"].as_array()?;
    let text: String = parts.iter().filter_map(|p| p["text"].as_str()).collect();
    (!text.is_empty()).then_some(text)
}

#[async_trait]
impl crate::provider::LanguageModel for GeminiProvider {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        let body = serde_json::json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}]
        });

        let url = format!("{}:generateContent", self.model_url());
        let resp = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let json: Value = resp.json().await?;

        if let Some(reason) = json["promptFeedback"]["blockReason"].as_str() {
            bail!("prompt blocked: {reason}");
        }
        candidate_text(&json).context("generateContent returned no text")
    }

    async fn ping(&self) -> anyhow::Result<()> {
        self.client
            .get(self.model_url())
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    fn info(&self) -> crate::provider::ProviderInfo {
        crate::provider::ProviderInfo {
            name: "gemini".to_string(),
            base_url: self.base_url.clone(),
            model: self.model.clone(),
        }
    }
}
