use gloo_timers::callback::Timeout;
use leptos::ev;
use leptos::html;
use leptos::prelude::*;
use leptos::task::spawn_local;
use web_sys::{File, HtmlInputElement};

use crate::AppChat;
use crate::autosize;
use crate::components::thread::format_size;
use crate::models::FileRef;
use crate::omnibox::{COMMANDS, OmniboxState, dispatch};

const EMOJIS: &[&str] = &["😀", "😂", "😊", "👍", "🙏", "🎉", "🤔", "🔥", "❤️", "🚀"];

/// Input box with slash commands, file attachments and an emoji picker.
#[component]
pub fn Omnibox(chat: StoredValue<AppChat, LocalStorage>, is_streaming: ReadSignal<bool>) -> impl IntoView {
    let draft = RwSignal::new_local(OmniboxState::<File>::default());
    let textarea_ref = NodeRef::<html::Textarea>::new();

    let refit = move || {
        if let Some(textarea) = textarea_ref.get_untracked() {
            autosize::fit(&textarea);
        }
    };

    let submit = move || {
        let Some(submission) = draft.try_update(OmniboxState::take_submission).flatten() else {
            return;
        };
        // Let the cleared value land before measuring.
        Timeout::new(0, refit).forget();

        let chat = chat.get_value();
        spawn_local(async move {
            dispatch(&chat, submission).await;
        });
    };

    let on_keydown = move |ev: ev::KeyboardEvent| {
        if ev.key() == "Enter" && !ev.shift_key() {
            ev.prevent_default();
            submit();
        }
    };

    let on_input = move |ev: ev::Event| {
        draft.update(|d| d.set_text(event_target_value(&ev)));
        refit();
    };

    let on_files = move |ev: ev::Event| {
        let input = event_target::<HtmlInputElement>(&ev);
        if let Some(list) = input.files() {
            let picked: Vec<File> = (0..list.length()).filter_map(|i| list.get(i)).collect();
            log::debug!("Attached {} files", picked.len());
            draft.update(|d| d.attach(picked));
        }
        // Picking the same file again must still fire `change`.
        input.set_value("");
    };

    let pick_command = move |key: &'static str| {
        draft.update(|d| d.set_text(format!("{key} ")));
        if let Some(textarea) = textarea_ref.get_untracked() {
            let _ = textarea.focus();
        }
    };

    let chips = move || {
        draft.with(|d| d.file_refs().into_iter().enumerate().collect::<Vec<_>>())
    };

    view! {
        <div class="input-area">
            <Show when=move || draft.with(|d| d.show_commands)>
                <ul class="command-menu">
                    {COMMANDS
                        .iter()
                        .map(|command| {
                            view! {
                                <li on:mousedown=move |ev: ev::MouseEvent| {
                                    ev.prevent_default();
                                    pick_command(command.key);
                                }>
                                    <span class="command-key">{command.key}</span>
                                    <span class="command-description">{command.description}</span>
                                </li>
                            }
                        })
                        .collect_view()}
                </ul>
            </Show>

            <Show when=move || draft.with(|d| d.show_emoji)>
                <div class="emoji-panel">
                    {EMOJIS
                        .iter()
                        .map(|emoji| {
                            view! {
                                <button
                                    class="emoji"
                                    on:click=move |_| {
                                        draft.update(|d| d.insert_emoji(emoji));
                                        refit();
                                    }
                                >
                                    {*emoji}
                                </button>
                            }
                        })
                        .collect_view()}
                </div>
            </Show>

            <ul class="pending-files">
                <For
                    each=chips
                    key=|(ix, file)| (*ix, file.name.clone())
                    children=move |(ix, file): (usize, FileRef)| {
                        view! {
                            <li class="chip">
                                {file.name}
                                <span class="size">{format_size(file.size)}</span>
                                <button
                                    class="chip-remove"
                                    aria-label="Remove attachment"
                                    on:click=move |_| draft.update(|d| d.remove_file(ix))
                                >
                                    "×"
                                </button>
                            </li>
                        }
                    }
                />
            </ul>

            <div class="input-row">
                <label class="attach-btn" title="Attach files">
                    "📎"
                    <input type="file" multiple=true style="display:none" on:change=on_files />
                </label>
                <button
                    class="emoji-btn"
                    title="Emoji"
                    on:click=move |_| draft.update(OmniboxState::toggle_emoji)
                >
                    "😊"
                </button>
                <textarea
                    node_ref=textarea_ref
                    rows="1"
                    placeholder="Type a message or / for commands (Enter to send, Shift+Enter for newline)"
                    prop:value=move || draft.with(|d| d.text.clone())
                    on:input=on_input
                    on:keydown=on_keydown
                />
                <button
                    class="send-btn"
                    on:click=move |_| submit()
                    disabled=move || draft.with(|d| d.text.trim().is_empty() && d.files.is_empty())
                >
                    {move || if is_streaming.get() { "Thinking…" } else { "Send" }}
                </button>
            </div>
        </div>
    }
}
