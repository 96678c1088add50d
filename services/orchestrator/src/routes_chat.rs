use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::orchestrator::ChatReply;
use crate::state::SharedState;
use crate::tenant::Tenant;

#[derive(Deserialize)]
pub struct ChatReq {
    pub message: String,
}

/// The turn runs on its own task. If the client disconnects, axum drops this
/// handler, the guard cancels the token, and the task stops without logging.
pub async fn chat(
    State(state): State<SharedState>,
    Tenant(tenant): Tenant,
    Json(req): Json<ChatReq>,
) -> Result<Json<ChatReply>, PipelineError> {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let task = tokio::spawn(async move { state.pipeline.chat(tenant, &req.message, &cancel).await });
    let reply = task
        .await
        .map_err(|e| PipelineError::Internal(format!("chat task failed: {e}")))??;
    Ok(Json(reply))
}
