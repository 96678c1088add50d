#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use analytics_orchestrator::{AnalyticsPipeline, LanguageModel, PipelineConfig, ProviderInfo, Upload};
use async_trait::async_trait;
use datastore::{
    Dataset, DatasetId, DatasetMetadata, DatasetPatch, DatasetStore, InMemoryDatasetStore, InMemoryHistoryStore,
    NewDataset, Result as StoreResult, TenantId,
};
use tempfile::TempDir;

pub const TWO_ROW_CSV: &str = "id,amount\n1,10\n2,20\n";

pub const SALES_CSV: &str = "sale_date,customer_id,product_name,amount\n\
2024-03-01,c1,Widget,120.50\n\
2024-03-02,c2,Gadget,80\n\
2024-03-02,c1,Widget,40\n\
2024-03-05,c3,Gizmo,15.25\n";

/// Replies with a fixed text and records every prompt.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn replying(texts: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(texts.iter().map(|t| t.to_string()).collect()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

fn info(name: &str) -> ProviderInfo {
    ProviderInfo {
        name: name.to_string(),
        base_url: "http://model.test".to_string(),
        model: "test".to_string(),
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "scripted reply".to_string()))
    }

    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn info(&self) -> ProviderInfo {
        info("scripted")
    }
}

pub struct FailingModel;

#[async_trait]
impl LanguageModel for FailingModel {
    async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
        anyhow::bail!("upstream 503: secret-internal-detail")
    }

    async fn ping(&self) -> anyhow::Result<()> {
        anyhow::bail!("down")
    }

    fn info(&self) -> ProviderInfo {
        info("failing")
    }
}

/// Never answers.
pub struct PendingModel;

#[async_trait]
impl LanguageModel for PendingModel {
    async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
        std::future::pending().await
    }

    async fn ping(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn info(&self) -> ProviderInfo {
        info("pending")
    }
}

/// Counts every call before delegating to the in-memory store.
#[derive(Default)]
pub struct CountingDatasetStore {
    inner: InMemoryDatasetStore,
    calls: AtomicUsize,
}

impl CountingDatasetStore {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DatasetStore for CountingDatasetStore {
    async fn save(&self, tenant: TenantId, new: NewDataset) -> StoreResult<Dataset> {
        self.hit();
        self.inner.save(tenant, new).await
    }
    async fn activate(&self, tenant: TenantId, id: DatasetId) -> StoreResult<Dataset> {
        self.hit();
        self.inner.activate(tenant, id).await
    }
    async fn get_active(&self, tenant: TenantId) -> StoreResult<Option<Dataset>> {
        self.hit();
        self.inner.get_active(tenant).await
    }
    async fn list(&self, tenant: TenantId) -> StoreResult<Vec<DatasetMetadata>> {
        self.hit();
        self.inner.list(tenant).await
    }
    async fn get(&self, tenant: TenantId, id: DatasetId) -> StoreResult<Dataset> {
        self.hit();
        self.inner.get(tenant, id).await
    }
    async fn update(&self, tenant: TenantId, id: DatasetId, patch: DatasetPatch) -> StoreResult<DatasetMetadata> {
        self.hit();
        self.inner.update(tenant, id, patch).await
    }
    async fn toggle_favorite(&self, tenant: TenantId, id: DatasetId) -> StoreResult<DatasetMetadata> {
        self.hit();
        self.inner.toggle_favorite(tenant, id).await
    }
    async fn delete(&self, tenant: TenantId, id: DatasetId) -> StoreResult<DatasetMetadata> {
        self.hit();
        self.inner.delete(tenant, id).await
    }
}

pub struct Harness {
    pub pipeline: AnalyticsPipeline,
    pub datasets: Arc<CountingDatasetStore>,
    pub history: Arc<InMemoryHistoryStore>,
    pub uploads: TempDir,
}

pub fn harness(model: Arc<dyn LanguageModel>) -> Harness {
    harness_with(model, |_| {})
}

pub fn harness_with(model: Arc<dyn LanguageModel>, tweak: impl FnOnce(&mut PipelineConfig)) -> Harness {
    let uploads = tempfile::tempdir().unwrap();
    let mut cfg = PipelineConfig {
        upload_dir: uploads.path().join("uploads"),
        llm_timeout: Duration::from_secs(5),
        ..PipelineConfig::default()
    };
    tweak(&mut cfg);

    let datasets = Arc::new(CountingDatasetStore::default());
    let history = Arc::new(InMemoryHistoryStore::new());
    let pipeline = AnalyticsPipeline::new(datasets.clone(), history.clone(), model, cfg);
    Harness {
        pipeline,
        datasets,
        history,
        uploads,
    }
}

pub fn upload(file_name: &str, body: &str) -> Upload {
    Upload {
        file_name: file_name.to_string(),
        content_type: Some("text/csv".to_string()),
        bytes: bytes::Bytes::from(body.to_string()),
        name: None,
        description: None,
    }
}

impl Harness {
    /// Upload and activate; returns the dataset id.
    pub async fn active_dataset(&self, tenant: TenantId, file_name: &str, body: &str) -> DatasetId {
        let meta = self.pipeline.upload_dataset(tenant, upload(file_name, body)).await.unwrap();
        self.pipeline.activate_dataset(tenant, meta.id).await.unwrap();
        meta.id
    }

    pub fn upload_files(&self) -> usize {
        std::fs::read_dir(self.uploads.path().join("uploads"))
            .map(|d| d.count())
            .unwrap_or(0)
    }
}
