mod api;
mod autosize;
mod chat;
mod components;
mod errors;
mod linkify;
mod models;
mod omnibox;
mod state;
#[cfg(test)]
mod testing;

use leptos::mount::mount_to_body;
use leptos::prelude::*;

use api::{API_BASE, GlooTransport};
use chat::Chat;
use components::shell::ChatShell;
use state::ChatView;

pub type AppChat = Chat<GlooTransport>;

/// Root application component.
#[component]
fn App() -> impl IntoView {
    let chat = AppChat::new(GlooTransport::new(API_BASE));
    let chat_view = ChatView::bind(&chat);
    let chat = StoredValue::new_local(chat);

    view! {
        <div class="app-container">
            <header class="chat-header">"AI Chatbot"</header>
            <ChatShell chat=chat chat_view=chat_view />
        </div>
    }
}

fn main() {
    if let Err(err) = console_log::init_with_level(log::Level::Debug) {
        web_sys::console::error_1(&format!("Logger already set: {err}").into());
    }
    log::info!("Chat client talking to {API_BASE}");
    mount_to_body(App);
}
