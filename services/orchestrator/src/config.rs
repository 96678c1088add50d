use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use insights::{ChartConfig, RecencyWindows};
use rust_decimal::Decimal;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LlmProviderKind {
    Gemini,
    LmStudio,
}

impl FromStr for LlmProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "lmstudio" | "lm-studio" | "openai" => Ok(Self::LmStudio),
            other => bail!("LLM_PROVIDER must be gemini or lmstudio, got {other:?}"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProviderKind,
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: Option<String>,
}

pub const MAX_TREND_WINDOW_DAYS: i64 = 3650;

/// Knobs of the pipeline itself; no process environment involved, so tests
/// build it directly.
#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub upload_dir: PathBuf,
    /// History turns included in a general-branch prompt.
    pub context_turns: usize,
    pub llm_timeout: Duration,
    pub chart: ChartConfig,
    pub recency: RecencyWindows,
    pub search_limit: usize,
    pub history_limit: usize,
    pub preview_rows: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("data/uploads"),
            context_turns: 3,
            llm_timeout: Duration::from_secs(30),
            chart: ChartConfig::default(),
            recency: RecencyWindows::default(),
            search_limit: 20,
            history_limit: 50,
            preview_rows: 10,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.llm_timeout.is_zero() {
            bail!("LLM_TIMEOUT_SECS must be positive");
        }
        if self.chart.premium_over <= self.chart.regular_over {
            bail!("SEGMENT_PREMIUM_OVER must be greater than SEGMENT_REGULAR_OVER");
        }
        if !(1..=MAX_TREND_WINDOW_DAYS).contains(&self.chart.trend_days) {
            bail!("TREND_WINDOW_DAYS must be between 1 and {MAX_TREND_WINDOW_DAYS}");
        }
        let w = &self.recency;
        if !(0 < w.active_days && w.active_days <= w.at_risk_days && w.at_risk_days <= w.lapsed_days) {
            bail!("recency windows must satisfy 0 < active <= at_risk <= lapsed");
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: String,
    pub max_upload_bytes: usize,
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let database_url = get("DATABASE_URL")?;
        let bind_addr = std::env::var("ORCH_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let max_upload_bytes = parse_or("MAX_UPLOAD_BYTES", 50 * 1024 * 1024)?;

        let provider: LlmProviderKind = parse_or("LLM_PROVIDER", LlmProviderKind::Gemini)?;
        let api_key = std::env::var("GEMINI_API_KEY").ok().filter(|k| !k.trim().is_empty());
        let model = match provider {
            LlmProviderKind::Gemini => {
                std::env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-2.5-flash".to_string())
            }
            LlmProviderKind::LmStudio => std::env::var("LLM_MODEL").unwrap_or_else(|_| "default".to_string()),
        };
        let base_url = std::env::var("LLM_BASE_URL").ok();

        let defaults = PipelineConfig::default();
        let pipeline = PipelineConfig {
            upload_dir: std::env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            context_turns: parse_or("CHAT_CONTEXT_TURNS", defaults.context_turns)?,
            llm_timeout: Duration::from_secs(parse_or("LLM_TIMEOUT_SECS", 30u64)?),
            chart: ChartConfig {
                premium_over: parse_or("SEGMENT_PREMIUM_OVER", Decimal::from(1000))?,
                regular_over: parse_or("SEGMENT_REGULAR_OVER", Decimal::from(500))?,
                trend_days: parse_or("TREND_WINDOW_DAYS", defaults.chart.trend_days)?,
                ..defaults.chart
            },
            recency: RecencyWindows {
                active_days: parse_or("RECENCY_ACTIVE_DAYS", defaults.recency.active_days)?,
                at_risk_days: parse_or("RECENCY_AT_RISK_DAYS", defaults.recency.at_risk_days)?,
                lapsed_days: parse_or("RECENCY_LAPSED_DAYS", defaults.recency.lapsed_days)?,
            },
            ..defaults
        };

        // Tiny sanity checks (fail fast, fail loud)
        if provider == LlmProviderKind::Gemini && api_key.is_none() {
            bail!("GEMINI_API_KEY is required when LLM_PROVIDER=gemini");
        }
        if let Some(url) = &base_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                bail!("LLM_BASE_URL must start with http:// or https://");
            }
        }
        if max_upload_bytes == 0 {
            bail!("MAX_UPLOAD_BYTES must be positive");
        }
        pipeline.validate()?;

        Ok(Self {
            database_url,
            bind_addr,
            max_upload_bytes,
            llm: LlmConfig {
                provider,
                api_key,
                model,
                base_url,
            },
            pipeline,
        })
    }
}

fn get(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Missing required env var: {key}"))
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid value for {key}: {e}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = PipelineConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.context_turns, 3);
        assert_eq!(cfg.chart.premium_over, Decimal::from(1000));
        assert_eq!(cfg.recency.lapsed_days, 90);
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.chart.regular_over = Decimal::from(2000);
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.recency.at_risk_days = 10;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn trend_window_is_bounded() {
        let mut cfg = PipelineConfig::default();
        cfg.chart.trend_days = MAX_TREND_WINDOW_DAYS;
        cfg.validate().unwrap();

        cfg.chart.trend_days = MAX_TREND_WINDOW_DAYS + 1;
        assert!(cfg.validate().is_err());

        cfg.chart.trend_days = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn provider_names() {
        assert_eq!("Gemini".parse::<LlmProviderKind>().unwrap(), LlmProviderKind::Gemini);
        assert_eq!("lmstudio".parse::<LlmProviderKind>().unwrap(), LlmProviderKind::LmStudio);
        assert!("mystery".parse::<LlmProviderKind>().is_err());
    }
}
