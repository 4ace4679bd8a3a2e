use std::sync::LazyLock;

use regex::Regex;

static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(https?://[^\s)]+)|(www\.[^\s)]+)").expect("valid url pattern")
});

/// A piece of message text, ready to render.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Link { href: String, text: String },
    Break,
}

/// Splits `text` into plain runs, links and line breaks. Bare `www.` links
/// get an `https://` href.
pub fn linkify(text: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut rest = 0;
    for m in URL_RE.find_iter(text) {
        push_text(&mut segments, &text[rest..m.start()]);
        let link = m.as_str();
        let href = if link.to_lowercase().starts_with("http") {
            link.to_string()
        } else {
            format!("https://{link}")
        };
        segments.push(Segment::Link { href, text: link.to_string() });
        rest = m.end();
    }
    push_text(&mut segments, &text[rest..]);
    segments
}

fn push_text(segments: &mut Vec<Segment>, text: &str) {
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            segments.push(Segment::Break);
        }
        if !line.is_empty() {
            segments.push(Segment::Text(line.to_string()));
        }
    }
}
