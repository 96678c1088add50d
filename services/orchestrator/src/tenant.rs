use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::Json;
use datastore::TenantId;
use serde_json::{json, Value};
use uuid::Uuid;

/// Set by the authenticating proxy in front of this service.
pub const TENANT_HEADER: &str = "x-tenant-id";

/// The already-authenticated tenant of a request.
#[derive(Clone, Copy, Debug)]
pub struct Tenant(pub TenantId);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Tenant {
    type Rejection = (StatusCode, Json<Value>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(TENANT_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or((
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "unauthenticated", "message": "missing tenant"})),
            ))?;
        let id = Uuid::parse_str(raw.trim()).map_err(|_| {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "invalid_input", "message": "malformed tenant id"})),
            )
        })?;
        Ok(Tenant(id))
    }
}
