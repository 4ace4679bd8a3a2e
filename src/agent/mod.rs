use async_trait::async_trait;
use rig::client::Nothing;
use rig::completion::Chat;
use rig::message::Message as RigMessage;
use rig::prelude::CompletionClient;
use rig::providers::ollama;
use tracing::{debug, error};

use crate::errors::AppError;
use crate::models::{ChatMessage, ChatRequest, MessageRole};

/// Runs one completion over a fully wrapped [`ChatRequest`].
#[async_trait]
pub trait Assistant: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<String, AppError>;
}

/// Splits the wire history into rig's `(prompt, history)` shape: blank turns
/// are skipped, the last remaining turn becomes the prompt.
fn to_rig_turns(messages: &[ChatMessage]) -> Option<(RigMessage, Vec<RigMessage>)> {
    let mut turns: Vec<RigMessage> = messages
        .iter()
        .filter(|m| !m.content.trim().is_empty())
        .map(|m| {
            let text = m.content.trim();
            match m.role() {
                MessageRole::Assistant => RigMessage::assistant(text),
                MessageRole::User | MessageRole::System => RigMessage::user(text),
            }
        })
        .collect();
    let prompt = turns.pop()?;
    Some((prompt, turns))
}

/// [`Assistant`] backed by a rig [`ollama::Client`]. A fresh agent is built per
/// request so the whole history is replayed every turn.
#[derive(Clone)]
pub struct OllamaAgentService {
    client: ollama::Client,
    base_url: String,
    model: String,
}

impl OllamaAgentService {
    pub fn new(base_url: &str, model: &str) -> Result<Self, AppError> {
        let client = ollama::Client::builder()
            .api_key(Nothing)
            .base_url(base_url)
            .build()
            .map_err(|e| AppError::Unexpected(format!("Failed to build Ollama client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl Assistant for OllamaAgentService {
    async fn complete(&self, request: &ChatRequest) -> Result<String, AppError> {
        let (prompt, history) =
            to_rig_turns(&request.messages).ok_or_else(|| AppError::empty("messages"))?;

        let mut builder = self
            .client
            .agent(&self.model)
            .max_tokens(u64::from(request.max_tokens_or_default()));
        if let Some(system) = request.system.as_deref().filter(|s| !s.trim().is_empty()) {
            builder = builder.preamble(system);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(temperature);
        }
        let agent = builder.build();

        debug!("Running completion on {} with {} prior turns", self.model, history.len());
        agent.chat(prompt, history).await.map_err(|e| {
            error!("Ollama inference failed: {e}");
            self.classify(e.to_string())
        })
    }
}

impl OllamaAgentService {
    fn classify(&self, msg: String) -> AppError {
        if is_unreachable(&msg) {
            AppError::OllamaUnavailable { host: self.base_url.clone() }
        } else if is_missing_model(&msg) {
            AppError::ModelNotFound { model_name: self.model.clone() }
        } else {
            AppError::InferenceError { message: msg }
        }
    }
}

fn is_unreachable(msg: &str) -> bool {
    msg.contains("Connection refused") || msg.contains("error sending request")
}

/// Ollama answers an unknown model with `model "x" not found, try pulling it first`.
fn is_missing_model(msg: &str) -> bool {
    let msg = msg.to_lowercase();
    msg.contains("model") && msg.contains("not found")
}
