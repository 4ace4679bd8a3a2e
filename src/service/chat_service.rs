use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, info};

use crate::agent::Assistant;
use crate::errors::AppError;
use crate::memory::ThreadMemory;
use crate::models::{ChatMessage, ChatRequest, ChatResponse, MessageRole, UploadedFile};
use crate::service::extract::files_context;
use crate::service::web_fetch::{find_urls, LinkFetcher};

const UPLOADED_FILES_LABEL: &str = "uploaded-files";
const OFFLINE_INSTRUCTION: &str = "You are offline. Do NOT say you cannot access the internet. \
     Any page or file content is already provided in the conversation context. Use it.";

/// Context gathered for one turn, rendered ahead of the conversation.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TurnContext {
    pub persisted: String,
    pub files: String,
    pub links: String,
}

/// Prepends the turn's context as a leading user message and appends the
/// offline instruction to the system prompt.
pub fn wrap_with_context(request: &ChatRequest, ctx: &TurnContext) -> ChatRequest {
    let mut block = String::new();
    if !ctx.persisted.trim().is_empty() {
        block.push_str("\n\n--- PERSISTED CONTEXT ---\n");
        block.push_str(&ctx.persisted);
    }
    if !ctx.files.is_empty() {
        block.push_str("\n\n--- FILES UPLOADED THIS TURN ---");
        block.push_str(&ctx.files);
    }
    if !ctx.links.is_empty() {
        block.push_str("\n\n--- LINKS FETCHED THIS TURN ---");
        block.push_str(&ctx.links);
    }

    let mut messages = request.messages.clone();
    if !block.is_empty() {
        messages.insert(
            0,
            ChatMessage::new(
                MessageRole::User,
                format!(
                    "Use ONLY the following context unless the user asks otherwise:\n\
                     ====================\n{block}\n===================="
                ),
            ),
        );
    }

    let system = match request.system.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(s) => format!("{s}\n\n{OFFLINE_INSTRUCTION}"),
        None => OFFLINE_INSTRUCTION.to_string(),
    };

    ChatRequest {
        messages,
        system: Some(system),
        ..request.clone()
    }
}

#[derive(Clone)]
pub struct ChatService {
    memory: ThreadMemory,
    agent: Arc<dyn Assistant>,
    links: LinkFetcher,
    fetch_links: bool,
}

impl ChatService {
    pub fn new(
        memory: ThreadMemory,
        agent: Arc<dyn Assistant>,
        links: LinkFetcher,
        fetch_links: bool,
    ) -> Self {
        Self { memory, agent, links, fetch_links }
    }

    pub fn memory(&self) -> &ThreadMemory {
        &self.memory
    }

    /// One non-streaming completion. `files` is empty for the JSON endpoint.
    pub async fn complete(
        &self,
        request: ChatRequest,
        thread_id: Option<&str>,
        files: &[UploadedFile],
    ) -> Result<ChatResponse, AppError> {
        // ── Validation ────────────────────────────────────────────────────────
        if request.messages.is_empty() {
            return Err(AppError::empty("messages"));
        }

        // ── Files of this turn, persisted under the thread ────────────────────
        let files_ctx = files_context(files);
        if let Some(thread) = thread_id {
            if !files_ctx.is_empty() {
                self.memory.append(thread, UPLOADED_FILES_LABEL, &files_ctx);
            }
        }

        // ── Links in the latest message ───────────────────────────────────────
        let links_ctx = self.links_context(request.last_message_text(), thread_id).await;

        // ── Wrap and complete ─────────────────────────────────────────────────
        let ctx = TurnContext {
            persisted: thread_id.map(|t| self.memory.snapshot(t)).unwrap_or_default(),
            files: files_ctx,
            links: links_ctx,
        };
        let wrapped = wrap_with_context(&request, &ctx);
        info!(
            "Completion for thread {} with {} messages and {} files",
            thread_id.unwrap_or("-"),
            wrapped.messages.len(),
            files.len()
        );
        let text = self.agent.complete(&wrapped).await?;

        Ok(ChatResponse {
            ok: true,
            text,
            tokens_requested: request.max_tokens,
            thread_id: thread_id.unwrap_or_default().to_string(),
        })
    }

    pub fn forget(&self, thread_id: &str) {
        self.memory.clear(thread_id);
    }

    async fn links_context(&self, text: &str, thread_id: Option<&str>) -> String {
        if !self.fetch_links {
            return String::new();
        }
        let urls = find_urls(text);
        if urls.is_empty() {
            return String::new();
        }
        debug!("Fetching {} links", urls.len());

        let pages = join_all(
            urls.iter().map(|raw| self.links.fetch_text_from_possibly_bare_url(raw)),
        )
        .await;

        let mut ctx = String::new();
        for (raw, page) in urls.iter().zip(pages) {
            if page.trim().is_empty() {
                continue;
            }
            ctx.push_str("\n\n=== ");
            ctx.push_str(raw);
            ctx.push_str(" ===\n");
            ctx.push_str(&page);
            if let Some(thread) = thread_id {
                self.memory.append(thread, raw, &page);
            }
        }
        ctx
    }
}
