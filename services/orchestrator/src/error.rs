use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use datastore::StoreError;
use serde_json::json;
use tabular::ParseError;
use thiserror::Error;
use tracing::error;

/// Shown instead of upstream model errors.
pub const ASSISTANT_UNAVAILABLE: &str = "The assistant is temporarily unavailable. Please try again.";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found")]
    NotFound,

    #[error("storage failure: {0}")]
    Storage(String),

    #[error("language model failure: {0}")]
    ExternalService(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl From<StoreError> for PipelineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => PipelineError::NotFound,
            StoreError::Storage(m) | StoreError::Serialization(m) => PipelineError::Storage(m),
        }
    }
}

impl PipelineError {
    /// Stable machine-readable tag.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Parse(ParseError::EmptyFile) => "empty_file",
            PipelineError::Parse(ParseError::UnsupportedType(_)) => "unsupported_type",
            PipelineError::Parse(ParseError::MalformedContent(_)) => "malformed_content",
            PipelineError::InvalidInput(_) => "invalid_input",
            PipelineError::NotFound => "not_found",
            PipelineError::Storage(_) => "storage_error",
            PipelineError::ExternalService(_) => "external_service_error",
            PipelineError::Cancelled => "cancelled",
            PipelineError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            PipelineError::Parse(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            PipelineError::NotFound => StatusCode::NOT_FOUND,
            PipelineError::Storage(_) | PipelineError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            PipelineError::ExternalService(_) => StatusCode::BAD_GATEWAY,
            // nginx's "client closed request"
            PipelineError::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::REQUEST_TIMEOUT),
        }
    }

    /// Text safe to show the user. Parse and input errors are user-correctable
    /// and surface verbatim; everything else is generic.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::Parse(e) => e.to_string(),
            PipelineError::InvalidInput(m) => m.clone(),
            PipelineError::NotFound => "Not found".to_string(),
            PipelineError::Storage(_) => "A storage error occurred. Please try again.".to_string(),
            PipelineError::ExternalService(_) => ASSISTANT_UNAVAILABLE.to_string(),
            PipelineError::Cancelled => "The request was cancelled.".to_string(),
            PipelineError::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        if matches!(self, PipelineError::Storage(_) | PipelineError::Internal(_)) {
            error!(kind = self.kind(), error = %self, "request failed");
        }
        let body = json!({
            "error": self.kind(),
            "message": self.user_message(),
        });
        (self.status(), Json(body)).into_response()
    }
}
