use chrono::{DateTime, Local};
use leptos::prelude::*;

use crate::linkify::{Segment, linkify};
use crate::models::{FileRef, Message};
use crate::state::ChatView;

/// The conversation log, oldest first, plus a typing indicator while a
/// request is pending.
#[component]
pub fn ChatThread(chat_view: ChatView) -> impl IntoView {
    view! {
        <div class="messages-container">
            <For
                each=move || chat_view.messages.get()
                key=|m| (m.id.clone(), m.content.clone())
                let:message
            >
                <MessageBubble message=message />
            </For>
            <Show when=move || chat_view.is_streaming.get()>
                <TypingIndicator />
            </Show>
        </div>
    }
}

#[component]
fn MessageBubble(message: Message) -> impl IntoView {
    let css_class = format!("message {}", message.role.as_str());
    let time = clock_time(message.timestamp);
    let body = linkify(&message.content)
        .into_iter()
        .map(render_segment)
        .collect_view();
    let attachments = message.attachments.map(|files| {
        view! {
            <ul class="attachments">
                {files.into_iter().map(attachment_chip).collect_view()}
            </ul>
        }
    });

    view! {
        <div class=css_class>
            <div class="role-label">
                {message.role.as_str()}
                <span class="timestamp">{time}</span>
            </div>
            <div class="content">{body}</div>
            {attachments}
        </div>
    }
}

fn render_segment(segment: Segment) -> AnyView {
    match segment {
        Segment::Text(text) => text.into_any(),
        Segment::Link { href, text } => view! {
            <a href=href target="_blank" rel="noopener noreferrer">{text}</a>
        }
        .into_any(),
        Segment::Break => view! { <br /> }.into_any(),
    }
}

fn attachment_chip(file: FileRef) -> impl IntoView {
    view! {
        <li class="attachment" title=file.kind>
            {file.name}
            <span class="size">{format_size(file.size)}</span>
        </li>
    }
}

#[component]
fn TypingIndicator() -> impl IntoView {
    view! {
        <div class="message assistant typing" aria-label="Assistant is typing">
            <span class="dot"></span>
            <span class="dot"></span>
            <span class="dot"></span>
        </div>
    }
}

/// Human-readable byte count, e.g. `12.5 KB`.
pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    let size = bytes as f64;
    if size < KB {
        format!("{bytes} B")
    } else if size < MB {
        format!("{:.1} KB", size / KB)
    } else {
        format!("{:.1} MB", size / MB)
    }
}

/// Local `HH:MM` for an epoch-millisecond timestamp; empty when out of range.
fn clock_time(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|t| t.with_timezone(&Local).format("%H:%M").to_string())
        .unwrap_or_default()
}
