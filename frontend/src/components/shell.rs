use leptos::prelude::*;

use crate::AppChat;
use crate::components::omnibox::Omnibox;
use crate::components::thread::ChatThread;
use crate::state::ChatView;

/// Thread above, input box below.
#[component]
pub fn ChatShell(chat: StoredValue<AppChat, LocalStorage>, chat_view: ChatView) -> impl IntoView {
    view! {
        <main class="chat-area">
            <ChatThread chat_view=chat_view />
            <Omnibox chat=chat is_streaming=chat_view.is_streaming />
        </main>
    }
}
