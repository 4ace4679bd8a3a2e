//! The message service: owns the conversation log and the single in-flight
//! completion request.
//!
//! State lives behind an `Rc<RefCell<_>>` and is only touched between awaits,
//! so every mutation is synchronous. Observers registered with
//! [`Chat::subscribe`] receive a [`ChatSnapshot`] after each change.
//!
//! Each request captures a generation number. Starting another request, or
//! clearing the thread, bumps the generation; a reply that arrives for an old
//! generation is dropped instead of touching the log or the pending flag.

use std::cell::RefCell;
use std::rc::Rc;

use futures::future::{AbortHandle, AbortRegistration, Abortable};
use log::{debug, warn};

use crate::api::{Transport, Upload};
use crate::errors::ChatError;
use crate::models::{new_thread_id, ChatPayload, ChatTurn, Message, Role};

/// Token budget requested on every completion.
pub const MAX_TOKENS: u32 = 768;

/// What observers see after each mutation.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatSnapshot {
    pub messages: Vec<Message>,
    pub is_streaming: bool,
}

type Observer = Box<dyn Fn(&ChatSnapshot)>;

struct ChatState<F> {
    messages: Vec<Message>,
    is_streaming: bool,
    active_request: Option<AbortHandle>,
    generation: u64,
    sticky_attachments: Vec<F>,
    thread_id: String,
    last_user_message_id: Option<String>,
}

impl<F> ChatState<F> {
    fn new() -> Self {
        Self {
            messages: vec![Message::greeting()],
            is_streaming: false,
            active_request: None,
            generation: 0,
            sticky_attachments: Vec::new(),
            thread_id: new_thread_id(),
            last_user_message_id: None,
        }
    }

    /// Cancels whatever is in flight and hands out a fresh abort registration.
    fn begin_request(&mut self) -> (u64, AbortRegistration) {
        self.is_streaming = true;
        if let Some(previous) = self.active_request.take() {
            previous.abort();
        }
        self.generation += 1;
        let (handle, registration) = AbortHandle::new_pair();
        self.active_request = Some(handle);
        (self.generation, registration)
    }

    /// Silently does nothing when no entry has `id`.
    fn mutate_message(&mut self, id: &str, mutate: impl FnOnce(&mut Message)) {
        if let Some(message) = self.messages.iter_mut().find(|m| m.id == id) {
            mutate(message);
        }
    }

    fn payload(&self) -> ChatPayload {
        let messages = self
            .messages
            .iter()
            .filter(|m| matches!(m.role, Role::User | Role::Assistant))
            .filter(|m| !m.content.trim().is_empty())
            .map(|m| ChatTurn { role: m.role, content: m.content.clone() })
            .collect();
        ChatPayload { messages, max_tokens: MAX_TOKENS }
    }

    fn snapshot(&self) -> ChatSnapshot {
        ChatSnapshot { messages: self.messages.clone(), is_streaming: self.is_streaming }
    }
}

struct Inner<T: Transport> {
    transport: T,
    state: RefCell<ChatState<T::File>>,
    observers: RefCell<Vec<Observer>>,
}

/// Cheap to clone; all clones share one session.
pub struct Chat<T: Transport> {
    inner: Rc<Inner<T>>,
}

impl<T: Transport> Clone for Chat<T> {
    fn clone(&self) -> Self {
        Self { inner: Rc::clone(&self.inner) }
    }
}

impl<T: Transport> Chat<T> {
    pub fn new(transport: T) -> Self {
        Self {
            inner: Rc::new(Inner {
                transport,
                state: RefCell::new(ChatState::new()),
                observers: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Registers `observer`; it runs after every subsequent state change.
    pub fn subscribe(&self, observer: impl Fn(&ChatSnapshot) + 'static) {
        self.inner.observers.borrow_mut().push(Box::new(observer));
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        self.inner.state.borrow().snapshot()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.inner.state.borrow().messages.clone()
    }

    pub fn is_streaming(&self) -> bool {
        self.inner.state.borrow().is_streaming
    }

    pub fn thread_id(&self) -> String {
        self.inner.state.borrow().thread_id.clone()
    }

    pub fn last_user_message_id(&self) -> Option<String> {
        self.inner.state.borrow().last_user_message_id.clone()
    }

    pub fn sticky_attachments(&self) -> Vec<T::File> {
        self.inner.state.borrow().sticky_attachments.clone()
    }

    fn notify(&self) {
        let snapshot = self.snapshot();
        for observer in self.inner.observers.borrow().iter() {
            observer(&snapshot);
        }
    }

    /// Appends the user turn plus an assistant placeholder, then fills the
    /// placeholder from the server. Files sent earlier in the thread are
    /// re-sent when `attachments` is empty.
    pub async fn send(&self, content: &str, attachments: Vec<T::File>) {
        if content.trim().is_empty() && attachments.is_empty() {
            return;
        }

        let (reply_id, generation, registration, files) = {
            let mut state = self.inner.state.borrow_mut();
            if !attachments.is_empty() {
                state.sticky_attachments = attachments.clone();
            }

            let user = Message::user(content, attachments.iter().map(Upload::file_ref).collect());
            state.last_user_message_id = Some(user.id.clone());
            state.messages.push(user);

            let reply = Message::placeholder();
            let reply_id = reply.id.clone();
            state.messages.push(reply);

            let (generation, registration) = state.begin_request();
            let files = if attachments.is_empty() {
                state.sticky_attachments.clone()
            } else {
                attachments
            };
            (reply_id, generation, registration, files)
        };
        self.notify();

        self.run_completion(generation, registration, &reply_id, files).await;
    }

    /// Cancels the in-flight request, if any.
    pub fn stop(&self) {
        let changed = {
            let mut state = self.inner.state.borrow_mut();
            let aborted = match state.active_request.take() {
                Some(handle) => {
                    handle.abort();
                    true
                }
                None => false,
            };
            let was_streaming = std::mem::replace(&mut state.is_streaming, false);
            aborted || was_streaming
        };
        if changed {
            self.notify();
        }
    }

    /// Drops the most recent assistant reply and asks for a new one.
    /// Attachments are never re-sent here.
    pub async fn regenerate(&self) {
        let (reply_id, generation, registration) = {
            let mut state = self.inner.state.borrow_mut();
            if let Some(ix) = state.messages.iter().rposition(|m| m.role == Role::Assistant) {
                state.messages.remove(ix);
            }
            let reply = Message::placeholder();
            let reply_id = reply.id.clone();
            state.messages.push(reply);

            let (generation, registration) = state.begin_request();
            (reply_id, generation, registration)
        };
        self.notify();

        self.run_completion(generation, registration, &reply_id, Vec::new()).await;
    }

    /// Starts a new thread: fresh id, greeting-only log. The server is asked
    /// to forget the old thread, best effort. Sticky attachments survive.
    pub fn clear(&self) {
        let old_thread_id = {
            let mut state = self.inner.state.borrow_mut();
            let old = std::mem::replace(&mut state.thread_id, new_thread_id());
            if let Some(handle) = state.active_request.take() {
                handle.abort();
            }
            state.generation += 1;
            state.messages = vec![Message::greeting()];
            state.is_streaming = false;
            state.last_user_message_id = None;
            old
        };
        self.inner.transport.forget_thread(old_thread_id);
        self.notify();
    }

    async fn run_completion(
        &self,
        generation: u64,
        registration: AbortRegistration,
        reply_id: &str,
        files: Vec<T::File>,
    ) {
        let (payload, thread_id) = {
            let state = self.inner.state.borrow();
            (state.payload(), state.thread_id.clone())
        };
        debug!(
            "Requesting completion {generation} with {} turns and {} files",
            payload.messages.len(),
            files.len()
        );

        let transport = &self.inner.transport;
        let request = async {
            let reply = if files.is_empty() {
                transport.complete(&thread_id, &payload).await?
            } else {
                transport.complete_with_files(&thread_id, &payload, &files).await?
            };
            reply.into_text()
        };
        let result = Abortable::new(request, registration)
            .await
            .unwrap_or_else(|_aborted| Err(ChatError::Aborted));

        self.finish(generation, reply_id, result);
    }

    fn finish(&self, generation: u64, reply_id: &str, result: Result<String, ChatError>) {
        {
            let mut state = self.inner.state.borrow_mut();
            if state.generation != generation {
                debug!("Dropping reply of superseded request {generation}");
                return;
            }
            match result {
                Ok(text) => state.mutate_message(reply_id, |m| m.content = text),
                Err(err) => {
                    warn!("Completion {generation} failed: {err}");
                    let note = format!("\n\n⚠️ {err}");
                    state.mutate_message(reply_id, |m| m.content.push_str(&note));
                }
            }
            state.is_streaming = false;
            state.active_request = None;
        }
        self.notify();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use futures::executor::{LocalPool, block_on};
    use futures::task::LocalSpawnExt;

    use super::*;
    use crate::models::GREETING;
    use crate::testing::{Call, Scripted, StubFile, StubTransport};

    fn chat() -> (Chat<StubTransport>, StubTransport) {
        let transport = StubTransport::default();
        (Chat::new(transport.clone()), transport)
    }

    fn contents(chat: &Chat<StubTransport>) -> Vec<(Role, String)> {
        chat.messages().into_iter().map(|m| (m.role, m.content)).collect()
    }

    #[test]
    fn starts_with_a_greeting() {
        let (chat, _) = chat();
        assert_eq!(contents(&chat), vec![(Role::Assistant, GREETING.to_string())]);
        assert!(!chat.is_streaming());
        assert_eq!(chat.last_user_message_id(), None);
    }

    #[test]
    fn successful_reply_fills_the_placeholder() {
        let (chat, transport) = chat();
        transport.script(Scripted::ok(r#"{"text":"Hello there"}"#));

        block_on(chat.send("Hi", vec![]));

        assert_eq!(
            contents(&chat),
            vec![
                (Role::Assistant, GREETING.to_string()),
                (Role::User, "Hi".to_string()),
                (Role::Assistant, "Hello there".to_string()),
            ]
        );
        assert!(!chat.is_streaming());
        assert_eq!(chat.last_user_message_id(), Some(chat.messages()[1].id.clone()));
    }

    #[test]
    fn http_failure_appends_a_warning() {
        let (chat, transport) = chat();
        transport.script(Scripted::status(500, "Internal Server Error", r#"{"error":"boom"}"#));

        block_on(chat.send("Hi", vec![]));

        let messages = chat.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2].role, Role::Assistant);
        assert_eq!(messages[2].content, "\n\n⚠️ HTTP boom");
        assert!(!chat.is_streaming());
    }

    #[test]
    fn network_failure_keeps_the_placeholder() {
        let (chat, transport) = chat();
        transport.script(Scripted::Fail(ChatError::Network("Failed to fetch".into())));
        transport.script(Scripted::ok(r#"{"text":"second"}"#));

        block_on(chat.send("one", vec![]));
        block_on(chat.send("two", vec![]));

        let roles: Vec<Role> = chat.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::Assistant, Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
        assert_eq!(chat.messages()[2].content, "\n\n⚠️ Failed to fetch");
        assert_eq!(chat.messages()[4].content, "second");
    }

    #[test]
    fn blank_send_changes_nothing() {
        let (chat, transport) = chat();
        let notified = Rc::new(Cell::new(0));
        let counter = Rc::clone(&notified);
        chat.subscribe(move |_| counter.set(counter.get() + 1));
        let before = chat.snapshot();

        block_on(chat.send("   \n", vec![]));

        assert_eq!(chat.snapshot(), before);
        assert_eq!(notified.get(), 0);
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn payload_carries_the_whole_non_empty_history() {
        let (chat, transport) = chat();
        transport.script(Scripted::ok(r#"{"text":"Hello there"}"#));
        transport.script(Scripted::ok(r#"{"text":"Fine"}"#));

        block_on(chat.send("Hi", vec![]));
        block_on(chat.send("How are you?", vec![]));

        let calls = transport.calls();
        let Call::Json { payload, thread_id } = &calls[1] else {
            panic!("expected a JSON completion, got {:?}", calls[1]);
        };
        assert_eq!(thread_id, &chat.thread_id());
        assert_eq!(payload.max_tokens, 768);
        let turns: Vec<(Role, &str)> =
            payload.messages.iter().map(|t| (t.role, t.content.as_str())).collect();
        assert_eq!(
            turns,
            vec![
                (Role::Assistant, GREETING),
                (Role::User, "Hi"),
                (Role::Assistant, "Hello there"),
                (Role::User, "How are you?"),
            ]
        );
    }

    #[test]
    fn attachments_stick_to_later_turns() {
        let (chat, transport) = chat();
        transport.script(Scripted::ok(r#"{"text":"got it"}"#));
        transport.script(Scripted::ok(r#"{"text":"still got it"}"#));
        let file = StubFile::new("report.txt", 12, "text/plain");

        block_on(chat.send("with file", vec![file.clone()]));
        block_on(chat.send("hello", vec![]));

        let calls = transport.calls();
        assert!(matches!(&calls[0], Call::Multipart { files, .. } if files == &vec![file.clone()]));
        assert!(matches!(&calls[1], Call::Multipart { files, .. } if files == &vec![file.clone()]));

        let messages = chat.messages();
        assert_eq!(messages[1].attachments, Some(vec![file.file_ref()]));
        assert_eq!(messages[3].attachments, None);
        assert_eq!(chat.sticky_attachments(), vec![file]);
    }

    #[test]
    fn new_attachments_replace_sticky_ones() {
        let (chat, transport) = chat();
        let first = StubFile::new("a.txt", 1, "text/plain");
        let second = StubFile::new("b.txt", 2, "text/plain");

        block_on(chat.send("a", vec![first]));
        block_on(chat.send("b", vec![second.clone()]));

        assert_eq!(chat.sticky_attachments(), vec![second.clone()]);
        assert!(matches!(&transport.calls()[1], Call::Multipart { files, .. } if files == &vec![second.clone()]));
    }

    #[test]
    fn stop_without_a_request_is_a_no_op() {
        let (chat, _) = chat();
        let notified = Rc::new(Cell::new(0));
        let counter = Rc::clone(&notified);
        chat.subscribe(move |_| counter.set(counter.get() + 1));
        let before = chat.snapshot();

        chat.stop();
        chat.stop();

        assert_eq!(chat.snapshot(), before);
        assert_eq!(notified.get(), 0);
    }

    #[test]
    fn stop_cancels_and_reports_the_abort() {
        let (chat, transport) = chat();
        let _pending = transport.script_deferred();
        let mut pool = LocalPool::new();
        let sending = chat.clone();
        pool.spawner()
            .spawn_local(async move { sending.send("Hi", vec![]).await })
            .unwrap();

        pool.run_until_stalled();
        assert!(chat.is_streaming());

        chat.stop();
        assert!(!chat.is_streaming());
        pool.run_until_stalled();

        let messages = chat.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2].content, "\n\n⚠️ The request was aborted.");
        assert!(!chat.is_streaming());
    }

    #[test]
    fn superseded_reply_is_dropped() {
        let (chat, transport) = chat();
        let first = transport.script_deferred();
        transport.script(Scripted::ok(r#"{"text":"second answer"}"#));

        let mut pool = LocalPool::new();
        let spawner = pool.spawner();
        let c1 = chat.clone();
        spawner.spawn_local(async move { c1.send("first", vec![]).await }).unwrap();
        pool.run_until_stalled();
        let c2 = chat.clone();
        spawner.spawn_local(async move { c2.send("second", vec![]).await }).unwrap();
        pool.run_until_stalled();

        // The first request was aborted when the second started; even if the
        // server still answers, nothing lands in the log.
        let _ = first.send(Ok(crate::api::HttpReply {
            status: 200,
            status_text: "OK".into(),
            body: r#"{"text":"late"}"#.into(),
        }));
        pool.run_until_stalled();

        let messages = chat.messages();
        assert_eq!(messages.len(), 5);
        assert_eq!(messages[2].content, "");
        assert_eq!(messages[4].content, "second answer");
        assert!(!chat.is_streaming());
    }

    #[test]
    fn regenerate_replaces_the_last_reply() {
        let (chat, transport) = chat();
        transport.script(Scripted::ok(r#"{"text":"first try"}"#));
        transport.script(Scripted::ok(r#"{"text":"second try"}"#));
        block_on(chat.send("Hi", vec![StubFile::new("a.txt", 1, "text/plain")]));
        let before = chat.messages();

        block_on(chat.regenerate());

        let after = chat.messages();
        assert_eq!(after.len(), before.len());
        assert_eq!(after[..2], before[..2]);
        assert_ne!(after[2].id, before[2].id);
        assert_eq!(after[2].content, "second try");

        // History excludes the removed reply and the empty placeholder.
        let Call::Json { payload, .. } = &transport.calls()[1] else {
            panic!("regenerate must not upload files");
        };
        assert_eq!(payload.messages.len(), 2);
        assert_eq!(payload.messages[1].content, "Hi");
    }

    #[test]
    fn regenerate_leaves_later_user_entries_alone() {
        let (chat, transport) = chat();
        transport.script(Scripted::ok(r#"{"text":"answer"}"#));
        block_on(chat.send("Hi", vec![]));
        // A user entry after the last reply (e.g. a failed send cleared mid-way).
        let trailing = Message::user("dangling", vec![]);
        chat.inner.state.borrow_mut().messages.push(trailing.clone());

        block_on(chat.regenerate());

        let messages = chat.messages();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[2], trailing);
        assert_eq!(messages[3].role, Role::Assistant);
    }

    #[test]
    fn clear_resets_to_a_fresh_thread() {
        let (chat, transport) = chat();
        let file = StubFile::new("a.txt", 1, "text/plain");
        block_on(chat.send("one", vec![file.clone()]));
        block_on(chat.send("two", vec![]));
        let old_thread = chat.thread_id();

        chat.clear();

        let messages = chat.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::Assistant);
        assert_eq!(messages[0].content, GREETING);
        assert_ne!(chat.thread_id(), old_thread);
        assert!(!chat.is_streaming());
        assert_eq!(chat.last_user_message_id(), None);
        assert_eq!(transport.calls().last(), Some(&Call::Forget(old_thread)));
        assert_eq!(chat.sticky_attachments(), vec![file]);
    }

    #[test]
    fn clear_discards_the_in_flight_reply() {
        let (chat, transport) = chat();
        let pending = transport.script_deferred();
        let mut pool = LocalPool::new();
        let sending = chat.clone();
        pool.spawner()
            .spawn_local(async move { sending.send("Hi", vec![]).await })
            .unwrap();
        pool.run_until_stalled();

        chat.clear();
        drop(pending);
        pool.run_until_stalled();

        assert_eq!(chat.messages().len(), 1);
        assert_eq!(chat.messages()[0].content, GREETING);
        assert!(!chat.is_streaming());
    }

    #[test]
    fn observers_see_pending_then_settled() {
        let (chat, transport) = chat();
        transport.script(Scripted::ok(r#"{"text":"done"}"#));
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        chat.subscribe(move |snap| {
            sink.borrow_mut().push((snap.messages.len(), snap.is_streaming))
        });

        block_on(chat.send("Hi", vec![]));

        assert_eq!(*seen.borrow(), vec![(3, true), (3, false)]);
        assert_eq!(chat.snapshot().messages[2].content, "done");
    }

    #[test]
    fn mutating_an_unknown_id_is_ignored() {
        let (chat, _) = chat();
        let before = chat.messages();
        chat.inner.state.borrow_mut().mutate_message("missing", |m| m.content.clear());
        assert_eq!(chat.messages(), before);
    }
}
