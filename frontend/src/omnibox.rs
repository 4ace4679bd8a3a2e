use log::debug;

use crate::api::{Transport, Upload};
use crate::chat::Chat;
use crate::models::FileRef;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    New,
    Stop,
    Regenerate,
}

pub struct CommandInfo {
    pub key: &'static str,
    pub description: &'static str,
}

pub const COMMANDS: &[CommandInfo] = &[
    CommandInfo { key: "/new", description: "Start a new topic (clear chat)" },
    CommandInfo { key: "/stop", description: "Stop current response" },
    CommandInfo { key: "/regenerate", description: "Regenerate last reply" },
];

impl Command {
    pub fn parse(word: &str) -> Option<Self> {
        match word {
            "/new" => Some(Command::New),
            "/stop" => Some(Command::Stop),
            "/regenerate" => Some(Command::Regenerate),
            _ => None,
        }
    }
}

/// What a submit turned into.
#[derive(Clone, Debug, PartialEq)]
pub enum Submission<F> {
    Command(Command),
    /// A `/word` nobody handles; dropped without feedback.
    Unrecognized(String),
    Message { text: String, files: Vec<F> },
}

/// Draft state of the input box.
#[derive(Clone, Debug)]
pub struct OmniboxState<F> {
    pub text: String,
    pub files: Vec<F>,
    pub show_commands: bool,
    pub show_emoji: bool,
}

impl<F> Default for OmniboxState<F> {
    fn default() -> Self {
        Self { text: String::new(), files: Vec::new(), show_commands: false, show_emoji: false }
    }
}

impl<F: Upload> OmniboxState<F> {
    pub fn set_text(&mut self, text: String) {
        self.show_commands = text.trim().starts_with('/');
        self.text = text;
    }

    pub fn insert_emoji(&mut self, emoji: &str) {
        let mut text = std::mem::take(&mut self.text);
        text.push_str(emoji);
        self.set_text(text);
    }

    pub fn toggle_emoji(&mut self) {
        self.show_emoji = !self.show_emoji;
    }

    pub fn attach(&mut self, files: impl IntoIterator<Item = F>) {
        self.files.extend(files);
    }

    /// Out-of-range indices are ignored.
    pub fn remove_file(&mut self, ix: usize) {
        if ix < self.files.len() {
            self.files.remove(ix);
        }
    }

    pub fn file_refs(&self) -> Vec<FileRef> {
        self.files.iter().map(Upload::file_ref).collect()
    }

    /// Turns the draft into a [`Submission`] and resets the draft. `None`
    /// (draft untouched) when there is neither text nor a file.
    pub fn take_submission(&mut self) -> Option<Submission<F>> {
        let value = self.text.trim().to_string();
        if value.is_empty() && self.files.is_empty() {
            return None;
        }

        let files = std::mem::take(&mut self.files);
        self.text.clear();
        self.show_commands = false;

        if value.starts_with('/') {
            let word = value.split_once(' ').map_or(value.as_str(), |(word, _)| word);
            return Some(match Command::parse(word) {
                Some(command) => Submission::Command(command),
                None => Submission::Unrecognized(word.to_string()),
            });
        }
        Some(Submission::Message { text: value, files })
    }
}

/// Routes a submission to the message service.
pub async fn dispatch<T: Transport>(chat: &Chat<T>, submission: Submission<T::File>) {
    match submission {
        Submission::Command(Command::New) => chat.clear(),
        Submission::Command(Command::Stop) => chat.stop(),
        Submission::Command(Command::Regenerate) => chat.regenerate().await,
        Submission::Message { text, files } => chat.send(&text, files).await,
        Submission::Unrecognized(word) => debug!("Ignoring unknown command {word}"),
    }
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;

    use super::*;
    use crate::models::{GREETING, Role};
    use crate::testing::{Call, StubFile, StubTransport};

    fn draft(text: &str) -> OmniboxState<StubFile> {
        let mut state = OmniboxState::default();
        state.set_text(text.to_string());
        state
    }

    #[test]
    fn slash_prefix_toggles_the_command_menu() {
        let mut state = draft("  /re");
        assert!(state.show_commands);
        state.set_text("hello /new".into());
        assert!(!state.show_commands);
    }

    #[test]
    fn blank_submit_is_a_no_op() {
        let mut state = draft("   ");
        assert_eq!(state.take_submission(), None);
        assert_eq!(state.text, "   ");
    }

    #[test]
    fn commands_ignore_trailing_text() {
        let mut state = draft("/regenerate please");
        assert_eq!(state.take_submission(), Some(Submission::Command(Command::Regenerate)));
        assert_eq!(state.text, "");
        assert!(!state.show_commands);
    }

    #[test]
    fn unknown_commands_still_reset_the_draft() {
        let mut state = draft("/shrug");
        state.attach([StubFile::new("a.txt", 1, "text/plain")]);
        assert_eq!(state.take_submission(), Some(Submission::Unrecognized("/shrug".into())));
        assert!(state.files.is_empty());
    }

    #[test]
    fn files_alone_can_be_sent() {
        let file = StubFile::new("a.txt", 1, "text/plain");
        let mut state = draft("");
        state.attach([file.clone()]);
        assert_eq!(
            state.take_submission(),
            Some(Submission::Message { text: String::new(), files: vec![file] })
        );
        assert!(state.files.is_empty());
    }

    #[test]
    fn message_text_is_trimmed() {
        let mut state = draft("  hi there \n");
        assert_eq!(
            state.take_submission(),
            Some(Submission::Message { text: "hi there".into(), files: vec![] })
        );
    }

    #[test]
    fn attaching_appends_and_removal_is_by_index() {
        let a = StubFile::new("a.txt", 1, "text/plain");
        let b = StubFile::new("b.txt", 2, "text/plain");
        let c = StubFile::new("c.txt", 3, "text/plain");
        let mut state = draft("");
        state.attach([a.clone(), b]);
        state.attach([c.clone()]);
        state.remove_file(1);
        state.remove_file(7);
        assert_eq!(state.files, vec![a, c]);
        assert_eq!(state.file_refs()[1].name, "c.txt");
    }

    #[test]
    fn emoji_is_appended_to_the_draft() {
        let mut state = draft("nice");
        state.toggle_emoji();
        state.insert_emoji("🎉");
        assert!(state.show_emoji);
        assert_eq!(state.text, "nice🎉");
    }

    #[test]
    fn new_command_clears_without_sending() {
        let transport = StubTransport::default();
        let chat = Chat::new(transport.clone());
        block_on(chat.send("Hi", vec![]));
        let old_thread = chat.thread_id();

        let submission = draft("/new").take_submission().unwrap();
        block_on(dispatch(&chat, submission));

        let messages = chat.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!((messages[0].role, messages[0].content.as_str()), (Role::Assistant, GREETING));
        let calls = transport.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1], Call::Forget(old_thread));
    }

    #[test]
    fn plain_text_is_sent() {
        let transport = StubTransport::default();
        let chat = Chat::new(transport.clone());

        let submission = draft("hello").take_submission().unwrap();
        block_on(dispatch(&chat, submission));

        assert_eq!(chat.messages().len(), 3);
        assert_eq!(chat.messages()[1].content, "hello");
        assert!(matches!(&transport.calls()[0], Call::Json { .. }));
    }

    #[test]
    fn unknown_command_touches_nothing() {
        let transport = StubTransport::default();
        let chat = Chat::new(transport.clone());
        let before = chat.snapshot();

        block_on(dispatch(&chat, Submission::Unrecognized("/shrug".into())));

        assert_eq!(chat.snapshot(), before);
        assert!(transport.calls().is_empty());
    }
}
