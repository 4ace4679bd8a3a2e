use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Top-level server error. Every variant carries a human-readable message
/// that ends up in the `error` field of the JSON error body.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Validation errors ────────────────────────────────────────────────────
    #[error("{field_name} must not be empty")]
    EmptyField { field_name: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Upload failed: {message}")]
    UploadFailed { message: String },

    // ── AI Agent errors ──────────────────────────────────────────────────────
    #[error("Ollama service unavailable at {host}")]
    OllamaUnavailable { host: String },

    #[error("Model '{model_name}' not found in Ollama")]
    ModelNotFound { model_name: String },

    #[error("Inference error: {message}")]
    InferenceError { message: String },

    // ── System errors ────────────────────────────────────────────────────────
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn empty(field_name: impl Into<String>) -> Self {
        AppError::EmptyField { field_name: field_name.into() }
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AppError::EmptyField { .. }
                | AppError::InvalidRequest { .. }
                | AppError::UploadFailed { .. }
        )
    }

    pub fn is_agent_unavailable(&self) -> bool {
        matches!(self, AppError::OllamaUnavailable { .. } | AppError::ModelNotFound { .. })
    }

    pub fn status(&self) -> StatusCode {
        if self.is_validation() {
            StatusCode::BAD_REQUEST
        } else if self.is_agent_unavailable() {
            StatusCode::SERVICE_UNAVAILABLE
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "ok": false, "error": self.to_string() }));
        (self.status(), body).into_response()
    }
}
