const DEFAULT_PORT: u16 = 8080;
const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama3.2";

/// Server settings, read from the environment (and `.env` when present).
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub port: u16,
    pub ollama_base_url: String,
    pub ollama_model: String,
    /// Fetch URLs found in the latest user message and inject their text.
    pub fetch_links: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            ollama_base_url: DEFAULT_OLLAMA_BASE_URL.to_string(),
            ollama_model: DEFAULT_MODEL.to_string(),
            fetch_links: true,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            ollama_base_url: lookup("OLLAMA_API_BASE_URL").unwrap_or(defaults.ollama_base_url),
            ollama_model: lookup("OLLAMA_MODEL").unwrap_or(defaults.ollama_model),
            fetch_links: lookup("FETCH_LINKS")
                .map(|v| !matches!(v.trim().to_lowercase().as_str(), "0" | "false" | "no" | "off"))
                .unwrap_or(defaults.fetch_links),
        }
    }
}
