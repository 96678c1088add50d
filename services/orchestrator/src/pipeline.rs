use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use datastore::{
    retry_read, ConversationTurn, DatasetId, DatasetMetadata, DatasetPatch, DatasetStore, HistoryStore, NewDataset,
    TenantId,
};
use insights::{Bucket, KpiOptions, KpiSet};
use serde::Serialize;
use tabular::Row;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::blocking::run_blocking;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::ingest::{self, Ingested};
use crate::orchestrator::{ChatReply, MessageOrchestrator};
use crate::provider::LanguageModel;

const MAX_HISTORY_LIMIT: usize = 500;

/// An uploaded file as handed over by the HTTP layer.
#[derive(Clone, Debug)]
pub struct Upload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
    /// Display name; defaults to the file stem.
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct DatasetDetail {
    #[serde(flatten)]
    pub metadata: DatasetMetadata,
    pub preview: Vec<Row>,
}

/// Result of a delete. The record is gone even when `warnings` is not empty.
#[derive(Clone, Debug, Serialize)]
pub struct DeleteReport {
    pub id: DatasetId,
    pub deleted: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ActiveKpis {
    pub dataset_id: DatasetId,
    pub dataset_name: String,
    pub kpis: KpiSet,
}

/// Every operation the HTTP layer exposes. Store handles are injected and
/// owned by the process entry point.
pub struct AnalyticsPipeline {
    datasets: Arc<dyn DatasetStore>,
    history: Arc<dyn HistoryStore>,
    orchestrator: MessageOrchestrator,
    cfg: Arc<PipelineConfig>,
}

impl AnalyticsPipeline {
    pub fn new(
        datasets: Arc<dyn DatasetStore>,
        history: Arc<dyn HistoryStore>,
        model: Arc<dyn LanguageModel>,
        cfg: PipelineConfig,
    ) -> Self {
        let cfg = Arc::new(cfg);
        let orchestrator = MessageOrchestrator::new(datasets.clone(), history.clone(), model, cfg.clone());
        Self {
            datasets,
            history,
            orchestrator,
            cfg,
        }
    }

    pub async fn upload_dataset(&self, tenant: TenantId, upload: Upload) -> Result<DatasetMetadata> {
        let bytes = upload.bytes.clone();
        let file_name = upload.file_name.clone();
        let Ingested {
            table,
            field_roles,
            content_hash,
        } = run_blocking(move || ingest::ingest(&bytes, &file_name)).await??;

        let path = self.write_backing_file(&upload).await?;
        let name = upload
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| file_stem(&upload.file_name));

        let new = NewDataset {
            name,
            description: upload.description.filter(|d| !d.trim().is_empty()),
            file_name: upload.file_name.clone(),
            file_path: Some(path.to_string_lossy().into_owned()),
            file_size: upload.bytes.len() as u64,
            content_type: upload.content_type,
            content_hash,
            field_roles,
            table,
        };

        match self.datasets.save(tenant, new).await {
            Ok(saved) => {
                info!(
                    %tenant,
                    dataset = %saved.metadata.id,
                    rows = saved.metadata.row_count,
                    columns = saved.metadata.column_count(),
                    "dataset: uploaded"
                );
                Ok(saved.metadata)
            }
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %rm, "dataset: could not remove orphaned upload");
                }
                Err(e.into())
            }
        }
    }

    async fn write_backing_file(&self, upload: &Upload) -> Result<PathBuf> {
        let ext = Path::new(&upload.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let path = self.cfg.upload_dir.join(format!("{}.{ext}", Uuid::new_v4()));

        tokio::fs::create_dir_all(&self.cfg.upload_dir)
            .await
            .map_err(|e| PipelineError::Storage(format!("create upload dir: {e}")))?;
        tokio::fs::write(&path, &upload.bytes)
            .await
            .map_err(|e| PipelineError::Storage(format!("write upload: {e}")))?;
        Ok(path)
    }

    pub async fn list_datasets(&self, tenant: TenantId) -> Result<Vec<DatasetMetadata>> {
        Ok(retry_read("datasets.list", || self.datasets.list(tenant)).await?)
    }

    pub async fn get_dataset(&self, tenant: TenantId, id: DatasetId) -> Result<DatasetDetail> {
        let dataset = retry_read("datasets.get", || self.datasets.get(tenant, id)).await?;
        let preview = dataset.table.preview(self.cfg.preview_rows).to_vec();
        Ok(DatasetDetail {
            metadata: dataset.metadata,
            preview,
        })
    }

    pub async fn update_dataset(&self, tenant: TenantId, id: DatasetId, patch: DatasetPatch) -> Result<DatasetMetadata> {
        if patch.is_empty() {
            return Err(PipelineError::InvalidInput("nothing to update".into()));
        }
        if patch.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(PipelineError::InvalidInput("name must not be blank".into()));
        }
        let patch = DatasetPatch {
            name: patch.name.map(|n| n.trim().to_string()),
            description: patch.description,
        };
        Ok(self.datasets.update(tenant, id, patch).await?)
    }

    pub async fn toggle_favorite(&self, tenant: TenantId, id: DatasetId) -> Result<DatasetMetadata> {
        Ok(self.datasets.toggle_favorite(tenant, id).await?)
    }

    pub async fn activate_dataset(&self, tenant: TenantId, id: DatasetId) -> Result<DatasetMetadata> {
        let dataset = self.datasets.activate(tenant, id).await?;
        info!(%tenant, dataset = %id, "dataset: activated");
        Ok(dataset.metadata)
    }

    /// The store record goes first and is authoritative; a backing file that
    /// cannot be removed is reported, not fatal.
    pub async fn delete_dataset(&self, tenant: TenantId, id: DatasetId) -> Result<DeleteReport> {
        let removed = self.datasets.delete(tenant, id).await?;
        info!(%tenant, dataset = %id, was_active = removed.active, "dataset: deleted");

        let mut warnings = Vec::new();
        if let Some(path) = &removed.file_path {
            if let Err(e) = tokio::fs::remove_file(path).await {
                warn!(%tenant, dataset = %id, path = %path, error = %e, "dataset: backing file not removed");
                warnings.push(format!("backing file {path} was not removed: {e}"));
            }
        }

        Ok(DeleteReport {
            id,
            deleted: true,
            warnings,
        })
    }

    pub async fn active_kpis(&self, tenant: TenantId, bucket: Bucket) -> Result<ActiveKpis> {
        let dataset = retry_read("datasets.get_active", || self.datasets.get_active(tenant))
            .await?
            .ok_or(PipelineError::NotFound)?;

        let opts = KpiOptions {
            bucket,
            recency: self.cfg.recency,
        };
        let dataset_id = dataset.metadata.id;
        let dataset_name = dataset.metadata.name.clone();
        let kpis = run_blocking(move || insights::summarize(&dataset.table, &dataset.metadata.field_roles, &opts)).await?;

        Ok(ActiveKpis {
            dataset_id,
            dataset_name,
            kpis,
        })
    }

    pub async fn chat(&self, tenant: TenantId, message: &str, cancel: &CancellationToken) -> Result<ChatReply> {
        self.orchestrator.handle(tenant, message, cancel).await
    }

    pub async fn get_history(&self, tenant: TenantId, limit: Option<usize>) -> Result<Vec<ConversationTurn>> {
        let limit = limit.unwrap_or(self.cfg.history_limit).clamp(1, MAX_HISTORY_LIMIT);
        Ok(retry_read("history.list", || self.history.list(tenant, limit)).await?)
    }

    pub async fn search_history(&self, tenant: TenantId, term: &str) -> Result<Vec<ConversationTurn>> {
        let term = term.trim();
        if term.is_empty() {
            return Err(PipelineError::InvalidInput("search term must not be empty".into()));
        }
        let limit = self.cfg.search_limit;
        Ok(retry_read("history.search", || self.history.search(tenant, term, limit)).await?)
    }

    pub async fn clear_history(&self, tenant: TenantId) -> Result<u64> {
        let removed = self.history.clear(tenant).await?;
        info!(%tenant, removed, "history: cleared");
        Ok(removed)
    }
}

fn file_stem(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("dataset")
        .to_string()
}
