use serde::{Deserialize, Serialize};

/// Seeded at start-up and after every `/new`.
pub const GREETING: &str = "Welcome! I'm your AI assistant. How can I help?";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        }
    }
}

/// Descriptor of an attached file; the bytes themselves stay with the browser.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub name: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub kind: String,
}

/// One entry of the conversation log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<FileRef>>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            role,
            content: content.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            attachments: None,
        }
    }

    pub fn greeting() -> Self {
        Self::new(Role::Assistant, GREETING)
    }

    /// Empty assistant entry that a pending request will fill in.
    pub fn placeholder() -> Self {
        Self::new(Role::Assistant, "")
    }

    pub fn user(content: impl Into<String>, attachments: Vec<FileRef>) -> Self {
        Self {
            attachments: (!attachments.is_empty()).then_some(attachments),
            ..Self::new(Role::User, content)
        }
    }
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

pub fn new_thread_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// `{role, content}` as sent to the completion endpoints.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

/// Request body shared by the JSON and multipart completion calls.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    pub messages: Vec<ChatTurn>,
    pub max_tokens: u32,
}
