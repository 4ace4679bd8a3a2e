//! In-memory transport for exercising the message service without a browser.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use async_trait::async_trait;
use futures::channel::oneshot;

use crate::api::{HttpReply, Transport, Upload};
use crate::errors::ChatError;
use crate::models::{ChatPayload, FileRef};

#[derive(Clone, Debug, PartialEq)]
pub struct StubFile {
    pub name: String,
    pub size: u64,
    pub kind: String,
}

impl StubFile {
    pub fn new(name: &str, size: u64, kind: &str) -> Self {
        Self { name: name.into(), size, kind: kind.into() }
    }
}

impl Upload for StubFile {
    fn file_ref(&self) -> FileRef {
        FileRef { name: self.name.clone(), size: self.size, kind: self.kind.clone() }
    }
}

/// What the stub was asked to do, in order.
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Json { thread_id: String, payload: ChatPayload },
    Multipart { thread_id: String, payload: ChatPayload, files: Vec<StubFile> },
    Forget(String),
}

/// Canned outcome for the next completion call.
pub enum Scripted {
    Reply(HttpReply),
    Fail(ChatError),
    /// Resolves when the test sends on the paired channel.
    Deferred(oneshot::Receiver<Result<HttpReply, ChatError>>),
}

impl Scripted {
    pub fn ok(body: &str) -> Self {
        Self::status(200, "OK", body)
    }

    pub fn status(status: u16, status_text: &str, body: &str) -> Self {
        Scripted::Reply(HttpReply {
            status,
            status_text: status_text.into(),
            body: body.into(),
        })
    }
}

#[derive(Default)]
struct Log {
    calls: Vec<Call>,
    script: VecDeque<Scripted>,
}

/// Unscripted calls answer `{"text":"ok"}`.
#[derive(Clone, Default)]
pub struct StubTransport {
    log: Rc<RefCell<Log>>,
}

impl StubTransport {
    pub fn script(&self, outcome: Scripted) {
        self.log.borrow_mut().script.push_back(outcome);
    }

    /// Queues a reply that stays pending until the returned sender fires.
    pub fn script_deferred(&self) -> oneshot::Sender<Result<HttpReply, ChatError>> {
        let (tx, rx) = oneshot::channel();
        self.script(Scripted::Deferred(rx));
        tx
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.borrow().calls.clone()
    }

    async fn answer(&self, call: Call) -> Result<HttpReply, ChatError> {
        let next = {
            let mut log = self.log.borrow_mut();
            log.calls.push(call);
            log.script.pop_front()
        };
        match next {
            None => Ok(HttpReply {
                status: 200,
                status_text: "OK".into(),
                body: r#"{"text":"ok"}"#.into(),
            }),
            Some(Scripted::Reply(reply)) => Ok(reply),
            Some(Scripted::Fail(err)) => Err(err),
            Some(Scripted::Deferred(rx)) => rx
                .await
                .unwrap_or_else(|_| Err(ChatError::Network("stub dropped".into()))),
        }
    }
}

#[async_trait(?Send)]
impl Transport for StubTransport {
    type File = StubFile;

    async fn complete(&self, thread_id: &str, payload: &ChatPayload) -> Result<HttpReply, ChatError> {
        self.answer(Call::Json { thread_id: thread_id.into(), payload: payload.clone() }).await
    }

    async fn complete_with_files(
        &self,
        thread_id: &str,
        payload: &ChatPayload,
        files: &[StubFile],
    ) -> Result<HttpReply, ChatError> {
        self.answer(Call::Multipart {
            thread_id: thread_id.into(),
            payload: payload.clone(),
            files: files.to_vec(),
        })
        .await
    }

    fn forget_thread(&self, thread_id: String) {
        self.log.borrow_mut().calls.push(Call::Forget(thread_id));
    }
}
