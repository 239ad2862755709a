mod comic;
mod config;
mod error;
mod gemini;
mod models;
mod prompts;
mod routes;
mod script;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{fmt, EnvFilter};

use crate::comic::ComicPipeline;
use crate::config::AppConfig;
use crate::gemini::GeminiClient;
use crate::routes::{router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = AppConfig::from_env()?;
    tracing::info!(
        text_model = %config.text_model,
        image_model = %config.image_model,
        "Using API key: {}",
        config.masked_key()
    );

    let gemini = Arc::new(GeminiClient::new(&config));
    let pipeline = ComicPipeline::new(gemini.clone(), gemini, config.dialogue_language.clone());
    let state = AppState { pipeline: Arc::new(pipeline) };
    let app = router(state, config.max_body_bytes);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "Starting server");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");
}
