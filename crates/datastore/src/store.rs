use std::future::Future;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, warn};

use crate::schema::{
    ConversationTurn, Dataset, DatasetId, DatasetMetadata, DatasetPatch, NewDataset, NewTurn, TenantId, TurnId,
};

#[derive(Debug, Error)]
pub enum StoreError {
    /// Missing, or owned by another tenant. The two are indistinguishable.
    #[error("not found")]
    NotFound,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Tenant-scoped dataset persistence. Every call names the tenant and
/// treats ids owned by other tenants as absent.
#[async_trait]
pub trait DatasetStore: Send + Sync {
    /// Persist a parsed table. New datasets are never active.
    async fn save(&self, tenant: TenantId, new: NewDataset) -> Result<Dataset>;

    /// Make `id` the tenant's only active dataset, atomically.
    async fn activate(&self, tenant: TenantId, id: DatasetId) -> Result<Dataset>;

    async fn get_active(&self, tenant: TenantId) -> Result<Option<Dataset>>;

    /// Newest first, without payloads.
    async fn list(&self, tenant: TenantId) -> Result<Vec<DatasetMetadata>>;

    async fn get(&self, tenant: TenantId, id: DatasetId) -> Result<Dataset>;

    async fn update(&self, tenant: TenantId, id: DatasetId, patch: DatasetPatch) -> Result<DatasetMetadata>;

    async fn toggle_favorite(&self, tenant: TenantId, id: DatasetId) -> Result<DatasetMetadata>;

    /// Remove metadata and payload, returning what was removed.
    async fn delete(&self, tenant: TenantId, id: DatasetId) -> Result<DatasetMetadata>;
}

/// Append-only per-tenant conversation log.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, tenant: TenantId, turn: NewTurn) -> Result<TurnId>;

    /// The `n` latest turns, oldest first.
    async fn recent(&self, tenant: TenantId, n: usize) -> Result<Vec<ConversationTurn>>;

    /// Newest first.
    async fn list(&self, tenant: TenantId, limit: usize) -> Result<Vec<ConversationTurn>>;

    /// Case-insensitive substring match over message and response, newest first.
    async fn search(&self, tenant: TenantId, term: &str, limit: usize) -> Result<Vec<ConversationTurn>>;

    /// Drop every turn of the tenant; returns how many were removed.
    async fn clear(&self, tenant: TenantId) -> Result<u64>;
}

/// Choose the active dataset out of every row flagged active. More than one
/// candidate is a broken invariant: it is logged and the most recently
/// activated row wins.
pub fn pick_active(mut candidates: Vec<Dataset>) -> Option<Dataset> {
    if candidates.len() > 1 {
        let ids: Vec<_> = candidates.iter().map(|d| d.metadata.id).collect();
        error!(
            tenant = %candidates[0].metadata.tenant_id,
            ?ids,
            "invariant violation: several datasets marked active"
        );
    }
    candidates.sort_by(|a, b| {
        let (a, b) = (&a.metadata, &b.metadata);
        b.activated_at
            .cmp(&a.activated_at)
            .then_with(|| b.updated_at.cmp(&a.updated_at))
            .then_with(|| b.id.cmp(&a.id))
    });
    candidates.into_iter().next()
}

/// Run an idempotent read, retrying once on a storage failure.
pub async fn retry_read<T, F, Fut>(op: &'static str, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match f().await {
        Err(StoreError::Storage(e)) => {
            warn!(op, error = %e, "read failed, retrying once");
            f().await
        }
        other => other,
    }
}
