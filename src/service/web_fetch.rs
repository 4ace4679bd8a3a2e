use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::header::CONTENT_TYPE;
use reqwest::Response;
use scraper::{Html, Node};
use tracing::warn;

use crate::service::extract::pdf_text;

const USER_AGENT: &str = "ai-chatbot/1.0 (+https://localhost)";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(6);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Bytes read from a response body before the rest is ignored.
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;
/// Chars of page text kept per link.
pub const MAX_TEXT: usize = 30_000;

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(https?://\S+|www\.\S+)").expect("valid url pattern"));

/// Every URL-looking token (`http(s)://…` or bare `www.…`) in `text`.
pub fn find_urls(text: &str) -> Vec<&str> {
    URL_RE.find_iter(text).map(|m| m.as_str()).collect()
}

/// Prefixes bare `www.` hosts with `https://`; `None` for non-URLs.
pub fn normalize_url(raw: &str) -> Option<String> {
    let t = raw.trim();
    let lower = t.to_lowercase();
    if (lower.starts_with("http://") || lower.starts_with("https://")) && t.len() > 8 {
        Some(t.to_string())
    } else if lower.starts_with("www.") && t.len() > 4 {
        Some(format!("https://{t}"))
    } else {
        None
    }
}

/// Visible text of an HTML document: text nodes outside `script`, `style`,
/// `noscript` and `template`, entities decoded, whitespace collapsed.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut words = Vec::new();
    for node in document.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| matches!(e.name(), "script" | "style" | "noscript" | "template"))
        });
        if !hidden {
            words.extend(text.split_whitespace());
        }
    }
    words.join(" ")
}

/// Caps `text` at [`MAX_TEXT`] chars, noting how much was cut.
pub fn truncate_text(text: String) -> String {
    let total = text.chars().count();
    if total <= MAX_TEXT {
        return text;
    }
    let kept: String = text.chars().take(MAX_TEXT).collect();
    format!("{kept}...\n\n[Content truncated at {MAX_TEXT} chars, {total} total]")
}

/// Reads at most `limit` bytes of the body.
async fn read_capped(mut response: Response, limit: usize) -> Result<Vec<u8>, reqwest::Error> {
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let room = limit - body.len();
        if chunk.len() >= room {
            body.extend_from_slice(&chunk[..room]);
            break;
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// Fetches pages linked from a chat message and reduces them to plain text.
/// Failures are reported inline as bracketed notes rather than errors.
#[derive(Clone)]
pub struct LinkFetcher {
    client: reqwest::Client,
}

impl LinkFetcher {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client })
    }

    /// Empty string when `raw` is not a URL.
    pub async fn fetch_text_from_possibly_bare_url(&self, raw: &str) -> String {
        match normalize_url(raw) {
            Some(url) => self.fetch_text(&url).await,
            None => String::new(),
        }
    }

    pub async fn fetch_text(&self, url: &str) -> String {
        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("Link fetch failed for {url}: {e}");
                return format!("[error fetching {url}: {e}]");
            }
        };

        let status = response.status();
        if status.as_u16() >= 400 {
            return format!("[fetch failed {} for {url}]", status.as_u16());
        }

        let ctype = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_lowercase();

        let body = match read_capped(response, MAX_BODY_BYTES).await {
            Ok(b) => b,
            Err(e) => return format!("[error fetching {url}: {e}]"),
        };

        let text = if ctype.contains("pdf") || url.to_lowercase().ends_with(".pdf") {
            pdf_text(&body, url)
        } else if ctype.contains("html") || ctype.contains("xml") {
            html_to_text(&String::from_utf8_lossy(&body))
        } else if ctype.starts_with("text/") {
            String::from_utf8_lossy(&body).into_owned()
        } else {
            return format!("[unsupported content-type: {ctype} for {url}]");
        };
        truncate_text(text)
    }
}
