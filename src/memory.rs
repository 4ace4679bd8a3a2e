use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

/// Upper bound on one thread's buffer, in chars.
const MAX_LEN: usize = 120_000;
/// Size the buffer is cut back to once it overflows.
const TRIM_TO: usize = MAX_LEN * 4 / 5;
const TRIM_MARKER: &str = "[memory trimmed]\n";

/// In-process, per-thread context buffer (fetched pages, uploaded file text).
/// Keyed by the client's `X-Thread-Id`; dropped on `DELETE /api/chat/memory`.
#[derive(Clone, Default)]
pub struct ThreadMemory {
    slots: Arc<Mutex<HashMap<String, String>>>,
}

impl ThreadMemory {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn append(&self, thread_id: &str, label: &str, text: &str) {
        if thread_id.trim().is_empty() || text.trim().is_empty() {
            return;
        }
        let mut slots = self.slots();
        let buf = slots.entry(thread_id.to_string()).or_default();
        if !buf.is_empty() {
            buf.push_str("\n\n");
        }
        buf.push_str("=== ");
        buf.push_str(label);
        buf.push_str(" ===\n");
        buf.push_str(text.trim());

        let len = buf.chars().count();
        if len > MAX_LEN {
            debug!("Trimming memory for thread {thread_id} ({len} chars)");
            *buf = format!("{TRIM_MARKER}{}", tail_chars(buf, TRIM_TO));
        }
    }

    /// Empty string for unknown threads.
    pub fn snapshot(&self, thread_id: &str) -> String {
        self.slots().get(thread_id).cloned().unwrap_or_default()
    }

    pub fn clear(&self, thread_id: &str) {
        if self.slots().remove(thread_id).is_some() {
            debug!("Dropped memory for thread {thread_id}");
        }
    }
}

fn tail_chars(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    match s.char_indices().rev().nth(n - 1) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}
