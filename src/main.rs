use std::sync::Arc;

use ai_chatbot::agent::OllamaAgentService;
use ai_chatbot::config::AppConfig;
use ai_chatbot::memory::ThreadMemory;
use ai_chatbot::service::chat_service::ChatService;
use ai_chatbot::service::web_fetch::LinkFetcher;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present (development convenience)
    dotenvy::dotenv().ok();

    // Initialise tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ai_chatbot=debug,tower_http=debug".into()),
        )
        .init();

    let config = AppConfig::from_env();

    // ── Dependency wiring ─────────────────────────────────────────────────────
    let agent = OllamaAgentService::new(&config.ollama_base_url, &config.ollama_model)?;
    let links = LinkFetcher::new()?;
    let chat_service =
        ChatService::new(ThreadMemory::new(), Arc::new(agent), links, config.fetch_links);
    info!(
        "Using model {} at {} (link fetching {})",
        config.ollama_model,
        config.ollama_base_url,
        if config.fetch_links { "on" } else { "off" }
    );

    let app = ai_chatbot::router(chat_service);

    // ── Listen ────────────────────────────────────────────────────────────────
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{addr}/");

    axum::serve(listener, app).await?;
    Ok(())
}
