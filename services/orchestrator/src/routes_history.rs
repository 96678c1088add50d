use axum::extract::{Query, State};
use axum::Json;
use datastore::ConversationTurn;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::PipelineError;
use crate::state::SharedState;
use crate::tenant::Tenant;

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

pub async fn get_history(
    State(state): State<SharedState>,
    Tenant(tenant): Tenant,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<Vec<ConversationTurn>>, PipelineError> {
    Ok(Json(state.pipeline.get_history(tenant, q.limit).await?))
}

pub async fn search_history(
    State(state): State<SharedState>,
    Tenant(tenant): Tenant,
    Query(q): Query<SearchQuery>,
) -> Result<Json<Vec<ConversationTurn>>, PipelineError> {
    Ok(Json(state.pipeline.search_history(tenant, &q.q).await?))
}

pub async fn clear_history(
    State(state): State<SharedState>,
    Tenant(tenant): Tenant,
) -> Result<Json<Value>, PipelineError> {
    let deleted = state.pipeline.clear_history(tenant).await?;
    Ok(Json(json!({ "deleted": deleted })))
}
