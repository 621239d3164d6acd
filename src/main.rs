use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use gemini_relay::{
    api::{self, AppState},
    config::ServerConfig,
    gemini::GeminiClient,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // -----------------------------
    // Logging
    // -----------------------------
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;

    // -----------------------------
    // Shared state
    // -----------------------------
    let backend = Arc::new(
        GeminiClient::new(&config.gemini).context("failed to build Gemini client")?,
    );
    let state = AppState::new(backend, &config.gemini);

    let app = api::app(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(
        default_model = %config.gemini.default_model,
        "Server running on port {}",
        config.port
    );

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
