use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

pub mod error;
pub mod handlers;
pub mod types;

use crate::{
    config::GeminiConfig,
    gemini::{ChatBackend, ModelHandle},
};
use handlers::{chat, health, list_models};

#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn ChatBackend>,
    pub default_model: ModelHandle,
    pub known_models: Arc<Vec<String>>,
}

impl AppState {
    pub fn new(backend: Arc<dyn ChatBackend>, config: &GeminiConfig) -> Self {
        Self {
            backend,
            default_model: default_handle(config),
            known_models: Arc::new(config.known_models.clone()),
        }
    }
}

// Used as-is when a request names no model, so it skips the allow-list.
fn default_handle(config: &GeminiConfig) -> ModelHandle {
    ModelHandle::parse(&config.default_model, &[]).unwrap_or_else(|err| {
        warn!(error = %err, "configured default model is unusable, using fallback");
        ModelHandle::fallback()
    })
}

pub fn api_router() -> Router<AppState> {
    Router::new()
        .route("/", get(health))
        .route("/api/models", get(list_models))
        .route("/api/chat", post(chat))
}

/// Full application: routes, CORS for browser frontends, request tracing.
pub fn app(state: AppState) -> Router {
    api_router()
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}
