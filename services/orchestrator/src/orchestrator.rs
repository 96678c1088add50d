//! Per-message state machine.
//!
//! `Received -> Classified -> Dispatched -> Responded -> Logged`. Stages are
//! not persisted; they only drive tracing. A turn is logged exactly once,
//! after a response exists and only if the request was not cancelled.

use std::sync::Arc;

use datastore::{retry_read, Classification, Dataset, DatasetStore, HistoryStore, NewTurn, TenantId, TurnId};
use insights::{ChartDescriptor, KpiOptions};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::blocking::run_blocking;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::provider::LanguageModel;
use crate::{analytics, classify, prompt, troubleshooting};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    Received,
    Classified,
    Dispatched,
    Responded,
    Logged,
}

impl Stage {
    fn as_str(self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::Classified => "classified",
            Stage::Dispatched => "dispatched",
            Stage::Responded => "responded",
            Stage::Logged => "logged",
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ChatReply {
    pub response: String,
    pub classification: Classification,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<ChartDescriptor>,
    pub turn_id: TurnId,
}

struct Outcome {
    classification: Classification,
    response: String,
    chart: Option<ChartDescriptor>,
}

/// Active dataset, fetched at most once per message.
enum ActiveSlot {
    Unloaded,
    Loaded(Option<Arc<Dataset>>),
}

pub struct MessageOrchestrator {
    datasets: Arc<dyn DatasetStore>,
    history: Arc<dyn HistoryStore>,
    model: Arc<dyn LanguageModel>,
    cfg: Arc<PipelineConfig>,
}

impl MessageOrchestrator {
    pub fn new(
        datasets: Arc<dyn DatasetStore>,
        history: Arc<dyn HistoryStore>,
        model: Arc<dyn LanguageModel>,
        cfg: Arc<PipelineConfig>,
    ) -> Self {
        Self {
            datasets,
            history,
            model,
            cfg,
        }
    }

    pub async fn handle(&self, tenant: TenantId, message: &str, cancel: &CancellationToken) -> Result<ChatReply> {
        let message = message.trim();
        if message.is_empty() {
            return Err(PipelineError::InvalidInput("message must not be empty".into()));
        }
        trace_stage(tenant, Stage::Received);

        let candidates = classify::candidates(message);
        debug!(%tenant, ?candidates, "chat: {}", Stage::Classified.as_str());

        let outcome = self.dispatch(tenant, message, &candidates, cancel).await?;
        trace_stage(tenant, Stage::Responded);

        // Nothing was delivered to a caller that went away.
        if cancel.is_cancelled() {
            info!(%tenant, "chat: cancelled before logging, turn dropped");
            return Err(PipelineError::Cancelled);
        }

        // Stored in the same shape the caller receives.
        let payload = outcome.chart.as_ref().map(serde_json::to_value).transpose().map_err(|e| {
            PipelineError::Internal(format!("chart payload: {e}"))
        })?;
        let turn_id = self
            .history
            .append(
                tenant,
                NewTurn {
                    message: message.to_string(),
                    response: outcome.response.clone(),
                    classification: outcome.classification,
                    payload,
                },
            )
            .await?;
        trace_stage(tenant, Stage::Logged);
        info!(%tenant, turn_id, classification = %outcome.classification, "chat: turn logged");

        Ok(ChatReply {
            response: outcome.response,
            classification: outcome.classification,
            payload: outcome.chart,
            turn_id,
        })
    }

    async fn dispatch(
        &self,
        tenant: TenantId,
        message: &str,
        candidates: &[Classification],
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        let mut active = ActiveSlot::Unloaded;

        for &classification in candidates {
            debug!(%tenant, %classification, "chat: {}", Stage::Dispatched.as_str());
            let outcome = match classification {
                Classification::Chart => self.chart(tenant, message, &mut active).await?,
                Classification::Analytics => Some(self.analytics(tenant, message, &mut active).await?),
                Classification::Troubleshooting => Some(Outcome {
                    classification,
                    response: troubleshooting::respond(message),
                    chart: None,
                }),
                Classification::General => Some(self.general(tenant, message, cancel).await?),
            };
            if let Some(outcome) = outcome {
                return Ok(outcome);
            }
            debug!(%tenant, %classification, "chat: branch declined, falling through");
        }

        // candidates always ends with General, which never declines
        Err(PipelineError::Internal("no branch produced a response".into()))
    }

    async fn active(&self, tenant: TenantId, slot: &mut ActiveSlot) -> Result<Option<Arc<Dataset>>> {
        if let ActiveSlot::Loaded(ds) = slot {
            return Ok(ds.clone());
        }
        let ds = retry_read("datasets.get_active", || self.datasets.get_active(tenant))
            .await?
            .map(Arc::new);
        *slot = ActiveSlot::Loaded(ds.clone());
        Ok(ds)
    }

    async fn chart(&self, tenant: TenantId, message: &str, slot: &mut ActiveSlot) -> Result<Option<Outcome>> {
        let Some(category) = insights::resolve_category(message) else {
            return Ok(None);
        };
        let Some(dataset) = self.active(tenant, slot).await? else {
            return Ok(None);
        };

        let cfg = self.cfg.chart.clone();
        let chart = run_blocking(move || {
            insights::synthesize(category, &dataset.table, &dataset.metadata.field_roles, &cfg)
        })
        .await?;

        Ok(chart.map(|chart| Outcome {
            classification: Classification::Chart,
            response: format!(
                "I've generated a {} chart showing {}. This visualization helps you understand the data at a glance.",
                chart.chart_type, chart.title
            ),
            chart: Some(chart),
        }))
    }

    async fn analytics(&self, tenant: TenantId, message: &str, slot: &mut ActiveSlot) -> Result<Outcome> {
        let response = match self.active(tenant, slot).await? {
            None => analytics::NO_ACTIVE_DATASET.to_string(),
            Some(dataset) => {
                let opts = KpiOptions {
                    recency: self.cfg.recency,
                    ..KpiOptions::default()
                };
                let message = message.to_string();
                run_blocking(move || {
                    let kpis = insights::summarize(&dataset.table, &dataset.metadata.field_roles, &opts);
                    analytics::explain(&message, &dataset.metadata.name, &kpis)
                })
                .await?
            }
        };
        Ok(Outcome {
            classification: Classification::Analytics,
            response,
            chart: None,
        })
    }

    async fn general(&self, tenant: TenantId, message: &str, cancel: &CancellationToken) -> Result<Outcome> {
        let n = self.cfg.context_turns;
        let context = retry_read("history.recent", || self.history.recent(tenant, n)).await?;
        let prompt = prompt::build(&context, message);

        let text = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(%tenant, "chat: cancelled while waiting for the language model");
                return Err(PipelineError::Cancelled);
            }
            r = tokio::time::timeout(self.cfg.llm_timeout, self.model.complete(&prompt)) => match r {
                Ok(Ok(text)) => text,
                Ok(Err(e)) => {
                    error!(%tenant, provider = %self.model.info().name, error = %e, "chat: language model call failed");
                    return Err(PipelineError::ExternalService(e.to_string()));
                }
                Err(_) => {
                    error!(%tenant, timeout = ?self.cfg.llm_timeout, "chat: language model timed out");
                    return Err(PipelineError::ExternalService(format!(
                        "timed out after {:?}",
                        self.cfg.llm_timeout
                    )));
                }
            }
        };

        let text = text.trim();
        if text.is_empty() {
            error!(%tenant, "chat: language model returned an empty completion");
            return Err(PipelineError::ExternalService("empty completion".into()));
        }
        Ok(Outcome {
            classification: Classification::General,
            response: text.to_string(),
            chart: None,
        })
    }
}

fn trace_stage(tenant: TenantId, stage: Stage) {
    debug!(%tenant, "chat: {}", stage.as_str());
}
