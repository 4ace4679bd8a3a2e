use leptos::prelude::*;

use crate::api::Transport;
use crate::chat::{Chat, ChatSnapshot};
use crate::models::Message;

/// Reactive mirror of a [`Chat`], for components to subscribe to.
#[derive(Clone, Copy)]
pub struct ChatView {
    pub messages: ReadSignal<Vec<Message>>,
    pub is_streaming: ReadSignal<bool>,
}

impl ChatView {
    /// Seeds the signals from the current snapshot and keeps them in sync.
    pub fn bind<T: Transport + 'static>(chat: &Chat<T>) -> Self {
        let ChatSnapshot { messages, is_streaming } = chat.snapshot();
        let (messages, set_messages) = signal(messages);
        let (is_streaming, set_is_streaming) = signal(is_streaming);

        chat.subscribe(move |snapshot| {
            set_messages.set(snapshot.messages.clone());
            set_is_streaming.set(snapshot.is_streaming);
        });

        Self { messages, is_streaming }
    }
}
