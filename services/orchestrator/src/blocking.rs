use crate::error::{PipelineError, Result};

/// Run CPU-bound work (parsing, KPI and chart computation) off the async
/// workers. A panic inside `f` surfaces as `Internal`.
pub async fn run_blocking<R, F>(f: F) -> Result<R>
where
    R: Send + 'static,
    F: FnOnce() -> R + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PipelineError::Internal(format!("blocking task failed: {e}")))
}
