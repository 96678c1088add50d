use anyhow::Context;
use async_trait::async_trait;

/// OpenAI-compatible chat completions (LM Studio and friends).
pub struct LmStudioProvider {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl LmStudioProvider {
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl crate::provider::LanguageModel for LmStudioProvider {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{"role":"user","content": prompt}],
            "temperature": 0.2
        });

        let url = format!("{}/v1/chat/completions", self.base_url);
        let resp = self.client.post(url).json(&body).send().await?.error_for_status()?;
        let json: serde_json::Value = resp.json().await?;

        json["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .context("completion response has no message content")
    }

    async fn ping(&self) -> anyhow::Result<()> {
        let url = format!("{}/v1/models", self.base_url);
        self.client.get(url).send().await?.error_for_status()?;
        Ok(())
    }

    fn info(&self) -> crate::provider::ProviderInfo {
        crate::provider::ProviderInfo {
            name: "lmstudio".to_string(),
            base_url: self.base_url.clone(),
            model: self.model.clone(),
        }
    }
}
