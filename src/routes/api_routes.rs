use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use tracing::debug;

use crate::errors::AppError;
use crate::models::{ChatRequest, ChatResponse, UploadedFile};
use crate::service::chat_service::ChatService;

pub const THREAD_HEADER: &str = "x-thread-id";

/// Blank or non-ASCII header values count as "no thread".
fn thread_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(THREAD_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn upload_error(err: MultipartError) -> AppError {
    AppError::UploadFailed { message: err.to_string() }
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// POST `/api/chat/completion` — JSON history in, `{ ok, text, … }` out
pub async fn completion_handler(
    State(svc): State<ChatService>,
    headers: HeaderMap,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let Json(request) =
        payload.map_err(|e| AppError::InvalidRequest { message: e.body_text() })?;
    let thread = thread_id(&headers);
    let response = svc.complete(request, thread.as_deref(), &[]).await?;
    Ok(Json(response))
}

/// POST `/api/chat/upload/completion` — multipart: one `request` part holding
/// the JSON history, any number of `file` parts
pub async fn upload_completion_handler(
    State(svc): State<ChatService>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<ChatResponse>, AppError> {
    let mut request: Option<ChatRequest> = None;
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(upload_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "request" => {
                let bytes = field.bytes().await.map_err(upload_error)?;
                let parsed = serde_json::from_slice::<ChatRequest>(&bytes).map_err(|e| {
                    AppError::InvalidRequest { message: format!("request part: {e}") }
                })?;
                request = Some(parsed);
            }
            "file" => {
                let file_name = field.file_name().unwrap_or("file").to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(upload_error)?;
                files.push(UploadedFile { name: file_name, content_type, bytes: bytes.to_vec() });
            }
            other => debug!("Ignoring multipart field '{other}'"),
        }
    }

    let request = request.ok_or_else(|| AppError::InvalidRequest {
        message: "missing 'request' part".to_string(),
    })?;
    let thread = thread_id(&headers);
    let response = svc.complete(request, thread.as_deref(), &files).await?;
    Ok(Json(response))
}

/// DELETE `/api/chat/memory` — drop everything remembered for `X-Thread-Id`
pub async fn clear_memory_handler(
    State(svc): State<ChatService>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let thread = thread_id(&headers).ok_or_else(|| AppError::empty("X-Thread-Id"))?;
    svc.forget(&thread);
    Ok(StatusCode::NO_CONTENT)
}

/// GET `/api/chat/ping`
pub async fn ping_handler() -> &'static str {
    "pong"
}
