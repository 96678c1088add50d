//! In-memory stores (for tests, demos and single-process runs)

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::schema::{
    ConversationTurn, Dataset, DatasetId, DatasetMetadata, DatasetPatch, NewDataset, NewTurn, TenantId, TurnId,
};
use crate::store::{pick_active, DatasetStore, HistoryStore, Result, StoreError};

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| StoreError::Storage("lock poisoned".into()))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| StoreError::Storage("lock poisoned".into()))
}

/// Datasets keyed by tenant. Activation holds the write lock for the whole
/// deactivate-then-activate step, which makes it atomic.
#[derive(Clone, Default)]
pub struct InMemoryDatasetStore {
    data: Arc<RwLock<HashMap<TenantId, Vec<Dataset>>>>,
}

impl InMemoryDatasetStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn find_mut(sets: &mut [Dataset], id: DatasetId) -> Result<&mut Dataset> {
    sets.iter_mut()
        .find(|d| d.metadata.id == id)
        .ok_or(StoreError::NotFound)
}

#[async_trait]
impl DatasetStore for InMemoryDatasetStore {
    async fn save(&self, tenant: TenantId, new: NewDataset) -> Result<Dataset> {
        let now = Utc::now();
        let dataset = Dataset {
            metadata: DatasetMetadata {
                id: Uuid::new_v4(),
                tenant_id: tenant,
                name: new.name,
                description: new.description,
                file_name: new.file_name,
                file_path: new.file_path,
                file_size: new.file_size,
                content_type: new.content_type,
                content_hash: new.content_hash,
                row_count: new.table.row_count(),
                columns: new.table.columns().to_vec(),
                field_roles: new.field_roles,
                is_favorite: false,
                active: false,
                activated_at: None,
                created_at: now,
                updated_at: now,
            },
            table: new.table,
        };

        write(&self.data)?
            .entry(tenant)
            .or_default()
            .push(dataset.clone());
        Ok(dataset)
    }

    async fn activate(&self, tenant: TenantId, id: DatasetId) -> Result<Dataset> {
        let mut data = write(&self.data)?;
        let sets = data.get_mut(&tenant).ok_or(StoreError::NotFound)?;
        if !sets.iter().any(|d| d.metadata.id == id) {
            return Err(StoreError::NotFound);
        }

        let now = Utc::now();
        for d in sets.iter_mut() {
            let target = d.metadata.id == id;
            if target {
                d.metadata.activated_at = Some(now);
                d.metadata.updated_at = now;
            } else if d.metadata.active {
                d.metadata.updated_at = now;
            }
            d.metadata.active = target;
        }
        Ok(find_mut(sets, id)?.clone())
    }

    async fn get_active(&self, tenant: TenantId) -> Result<Option<Dataset>> {
        let data = read(&self.data)?;
        let candidates = data
            .get(&tenant)
            .map(|sets| sets.iter().filter(|d| d.metadata.active).cloned().collect())
            .unwrap_or_default();
        Ok(pick_active(candidates))
    }

    async fn list(&self, tenant: TenantId) -> Result<Vec<DatasetMetadata>> {
        let data = read(&self.data)?;
        let mut out: Vec<DatasetMetadata> = data
            .get(&tenant)
            .map(|sets| sets.iter().map(|d| d.metadata.clone()).collect())
            .unwrap_or_default();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    async fn get(&self, tenant: TenantId, id: DatasetId) -> Result<Dataset> {
        read(&self.data)?
            .get(&tenant)
            .and_then(|sets| sets.iter().find(|d| d.metadata.id == id))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update(&self, tenant: TenantId, id: DatasetId, patch: DatasetPatch) -> Result<DatasetMetadata> {
        let mut data = write(&self.data)?;
        let sets = data.get_mut(&tenant).ok_or(StoreError::NotFound)?;
        let d = find_mut(sets, id)?;
        if let Some(name) = patch.name {
            d.metadata.name = name;
        }
        if let Some(description) = patch.description {
            d.metadata.description = Some(description);
        }
        d.metadata.updated_at = Utc::now();
        Ok(d.metadata.clone())
    }

    async fn toggle_favorite(&self, tenant: TenantId, id: DatasetId) -> Result<DatasetMetadata> {
        let mut data = write(&self.data)?;
        let sets = data.get_mut(&tenant).ok_or(StoreError::NotFound)?;
        let d = find_mut(sets, id)?;
        d.metadata.is_favorite = !d.metadata.is_favorite;
        d.metadata.updated_at = Utc::now();
        Ok(d.metadata.clone())
    }

    async fn delete(&self, tenant: TenantId, id: DatasetId) -> Result<DatasetMetadata> {
        let mut data = write(&self.data)?;
        let sets = data.get_mut(&tenant).ok_or(StoreError::NotFound)?;
        let pos = sets
            .iter()
            .position(|d| d.metadata.id == id)
            .ok_or(StoreError::NotFound)?;
        Ok(sets.remove(pos).metadata)
    }
}

#[derive(Default)]
struct HistoryInner {
    next_id: TurnId,
    turns: HashMap<TenantId, Vec<ConversationTurn>>,
}

/// Turns per tenant in append order.
#[derive(Clone, Default)]
pub struct InMemoryHistoryStore {
    inner: Arc<RwLock<HistoryInner>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(&self, tenant: TenantId, turn: NewTurn) -> Result<TurnId> {
        let mut inner = write(&self.inner)?;
        inner.next_id += 1;
        let id = inner.next_id;
        inner.turns.entry(tenant).or_default().push(ConversationTurn {
            id,
            tenant_id: tenant,
            message: turn.message,
            response: turn.response,
            classification: turn.classification,
            payload: turn.payload,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn recent(&self, tenant: TenantId, n: usize) -> Result<Vec<ConversationTurn>> {
        let inner = read(&self.inner)?;
        let turns = inner.turns.get(&tenant).map(Vec::as_slice).unwrap_or_default();
        Ok(turns[turns.len().saturating_sub(n)..].to_vec())
    }

    async fn list(&self, tenant: TenantId, limit: usize) -> Result<Vec<ConversationTurn>> {
        let inner = read(&self.inner)?;
        Ok(inner
            .turns
            .get(&tenant)
            .map(|t| t.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn search(&self, tenant: TenantId, term: &str, limit: usize) -> Result<Vec<ConversationTurn>> {
        let needle = term.to_lowercase();
        let inner = read(&self.inner)?;
        Ok(inner
            .turns
            .get(&tenant)
            .map(|t| {
                t.iter()
                    .rev()
                    .filter(|turn| {
                        turn.message.to_lowercase().contains(&needle)
                            || turn.response.to_lowercase().contains(&needle)
                    })
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn clear(&self, tenant: TenantId) -> Result<u64> {
        let mut inner = write(&self.inner)?;
        Ok(inner.turns.remove(&tenant).map_or(0, |t| t.len() as u64))
    }
}
