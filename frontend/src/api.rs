use async_trait::async_trait;
use gloo_net::http::{Request, Response};
use serde_json::Value;
use wasm_bindgen::JsValue;
use web_sys::{AbortController, AbortSignal, Blob, BlobPropertyBag, File, FormData};

use crate::errors::ChatError;
use crate::models::{ChatPayload, FileRef};

/// Base URL of the chat API, fixed at build time.
pub const API_BASE: &str = match option_env!("CHAT_API_BASE") {
    Some(base) => base,
    None => "http://localhost:8080",
};

const COMPLETION_PATH: &str = "/api/chat/completion";
const UPLOAD_COMPLETION_PATH: &str = "/api/chat/upload/completion";
const MEMORY_PATH: &str = "/api/chat/memory";
const THREAD_HEADER: &str = "X-Thread-Id";

/// A file the user picked that can be described and uploaded.
pub trait Upload: Clone {
    fn file_ref(&self) -> FileRef;
}

impl Upload for File {
    fn file_ref(&self) -> FileRef {
        FileRef {
            name: self.name(),
            size: self.size() as u64,
            kind: self.type_(),
        }
    }
}

/// Status and raw body of a completion response.
#[derive(Clone, Debug, PartialEq)]
pub struct HttpReply {
    pub status: u16,
    pub status_text: String,
    pub body: String,
}

impl HttpReply {
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Reply text of a successful response, or the best error message the
    /// body offers. Bodies that are not JSON count as absent.
    pub fn into_text(self) -> Result<String, ChatError> {
        let data: Option<Value> = serde_json::from_str(&self.body).ok();

        if !self.ok() {
            let message = data
                .as_ref()
                .and_then(|d| truthy_text(d.get("message")).or_else(|| truthy_text(d.get("error"))))
                .unwrap_or_else(|| format!("{} {}", self.status, self.status_text).trim_end().to_string());
            return Err(ChatError::Http(message));
        }

        Ok(match data {
            None => String::new(),
            Some(Value::String(s)) => s,
            Some(value) => match value.get("text") {
                Some(Value::String(text)) => text.clone(),
                _ => value.to_string(),
            },
        })
    }
}

fn truthy_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        other => Some(other.to_string()),
    }
}

/// The remote side of the message service. Implementations only move bytes;
/// interpreting replies is done by [`HttpReply::into_text`].
#[async_trait(?Send)]
pub trait Transport: 'static {
    type File: Upload + 'static;

    /// `POST /api/chat/completion` with a JSON body.
    async fn complete(&self, thread_id: &str, payload: &ChatPayload) -> Result<HttpReply, ChatError>;

    /// `POST /api/chat/upload/completion` with `file` parts and a `request` part.
    async fn complete_with_files(
        &self,
        thread_id: &str,
        payload: &ChatPayload,
        files: &[Self::File],
    ) -> Result<HttpReply, ChatError>;

    /// Fire-and-forget `DELETE /api/chat/memory`; failures are swallowed.
    fn forget_thread(&self, thread_id: String);
}

/// Aborts the underlying `fetch` when the request future is dropped.
struct AbortOnDrop(Option<AbortController>);

impl AbortOnDrop {
    fn new() -> Self {
        Self(AbortController::new().ok())
    }

    fn signal(&self) -> Option<AbortSignal> {
        self.0.as_ref().map(AbortController::signal)
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        if let Some(controller) = &self.0 {
            controller.abort();
        }
    }
}

fn network(err: gloo_net::Error) -> ChatError {
    ChatError::Network(err.to_string())
}

fn js(err: JsValue) -> ChatError {
    ChatError::Network(err.as_string().unwrap_or_else(|| format!("{err:?}")))
}

async fn read_reply(response: Response) -> HttpReply {
    HttpReply {
        status: response.status(),
        status_text: response.status_text(),
        body: response.text().await.unwrap_or_default(),
    }
}

/// Browser `fetch` transport built on gloo-net.
#[derive(Clone, Debug)]
pub struct GlooTransport {
    base_url: String,
}

impl GlooTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into().trim_end_matches('/').to_string() }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait(?Send)]
impl Transport for GlooTransport {
    type File = File;

    async fn complete(&self, thread_id: &str, payload: &ChatPayload) -> Result<HttpReply, ChatError> {
        let body = serde_json::to_string(payload).map_err(|e| ChatError::Encode(e.to_string()))?;
        let abort = AbortOnDrop::new();
        let signal = abort.signal();

        let response = Request::post(&self.url(COMPLETION_PATH))
            .header("Accept", "application/json")
            .header("Content-Type", "application/json")
            .header(THREAD_HEADER, thread_id)
            .abort_signal(signal.as_ref())
            .body(body)
            .map_err(network)?
            .send()
            .await
            .map_err(network)?;

        Ok(read_reply(response).await)
    }

    async fn complete_with_files(
        &self,
        thread_id: &str,
        payload: &ChatPayload,
        files: &[File],
    ) -> Result<HttpReply, ChatError> {
        let form = FormData::new().map_err(js)?;
        for file in files {
            form.append_with_blob_and_filename("file", file, &file.name()).map_err(js)?;
        }

        let json = serde_json::to_string(payload).map_err(|e| ChatError::Encode(e.to_string()))?;
        let options = BlobPropertyBag::new();
        options.set_type("application/json");
        let parts = js_sys::Array::of1(&JsValue::from_str(&json));
        let request_part = Blob::new_with_str_sequence_and_options(&parts, &options).map_err(js)?;
        form.append_with_blob("request", &request_part).map_err(js)?;

        let abort = AbortOnDrop::new();
        let signal = abort.signal();

        // No Content-Type: the browser fills in the multipart boundary.
        let response = Request::post(&self.url(UPLOAD_COMPLETION_PATH))
            .header("Accept", "application/json")
            .header(THREAD_HEADER, thread_id)
            .abort_signal(signal.as_ref())
            .body(form)
            .map_err(network)?
            .send()
            .await
            .map_err(network)?;

        Ok(read_reply(response).await)
    }

    fn forget_thread(&self, thread_id: String) {
        let url = self.url(MEMORY_PATH);
        wasm_bindgen_futures::spawn_local(async move {
            if let Err(e) = Request::delete(&url).header(THREAD_HEADER, &thread_id).send().await {
                log::debug!("Memory delete for thread {thread_id} failed: {e}");
            }
        });
    }
}
