use axum::extract::{DefaultBodyLimit, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::SharedState;
use crate::{routes_chat, routes_datasets, routes_history};

pub fn build_router(state: SharedState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/datasets",
            post(routes_datasets::post_dataset).get(routes_datasets::list_datasets),
        )
        .route("/datasets/active/kpis", get(routes_datasets::active_kpis))
        .route(
            "/datasets/:id",
            get(routes_datasets::get_dataset)
                .patch(routes_datasets::patch_dataset)
                .delete(routes_datasets::delete_dataset),
        )
        .route("/datasets/:id/activate", post(routes_datasets::activate_dataset))
        .route("/datasets/:id/favorite", post(routes_datasets::favorite_dataset))
        .route("/chat", post(routes_chat::chat))
        .route(
            "/chat/history",
            get(routes_history::get_history).delete(routes_history::clear_history),
        )
        .route("/chat/history/search", get(routes_history::search_history))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "provider": state.provider,
    }))
}
