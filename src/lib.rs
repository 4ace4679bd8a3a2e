pub mod agent;
pub mod config;
pub mod errors;
pub mod memory;
pub mod models;
pub mod routes;
pub mod service;

use axum::extract::DefaultBodyLimit;
use axum::http::Method;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::routes::api_routes::{
    clear_memory_handler, completion_handler, ping_handler, upload_completion_handler,
};
use crate::service::chat_service::ChatService;

/// Upload requests may carry several documents.
const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Builds the HTTP router the browser client talks to.
pub fn router(service: ChatService) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS]);

    Router::new()
        .route("/api/chat/completion", post(completion_handler))
        .route(
            "/api/chat/upload/completion",
            post(upload_completion_handler).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/api/chat/memory", delete(clear_memory_handler))
        .route("/api/chat/ping", get(ping_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}
