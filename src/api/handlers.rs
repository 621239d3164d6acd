use axum::{extract::rejection::JsonRejection, extract::State, Json};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    api::{
        error::ApiError,
        types::{ChatRequest, ChatResponse, HealthResponse, ModelsResponse},
        AppState,
    },
    gemini::resolve_or_fallback,
};

pub const SERVICE_BANNER: &str = "Gemini API Backend is running!";

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        message: SERVICE_BANNER.into(),
        available_models: state.known_models.as_ref().clone(),
    })
}

pub async fn list_models(
    State(state): State<AppState>,
) -> Result<Json<ModelsResponse>, ApiError> {
    let models = state.backend.list_models().await.map_err(|err| {
        error!(error = %err, "error listing models");
        ApiError::Internal(format!("Failed to list models: {err}"))
    })?;

    Ok(Json(ModelsResponse { models }))
}

pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    // An unreadable body is handled the same as one without a message.
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => {
            debug!(%rejection, "chat body rejected");
            ChatRequest::default()
        }
    };

    let message = match req.message {
        Some(m) if !m.is_empty() => m,
        _ => return Err(ApiError::message_required()),
    };

    let request_id = Uuid::new_v4();
    let model = match req.model_name.as_deref() {
        Some(requested) => resolve_or_fallback(state.backend.as_ref(), requested),
        None => state.default_model.clone(),
    };

    info!(%request_id, model = model.id(), "chat request");

    let text = state
        .backend
        .generate(&model, &message)
        .await
        .map_err(|err| {
            error!(%request_id, model = model.id(), error = %err, "chat generation failed");
            ApiError::Internal(format!("Internal server error: {err}"))
        })?;

    Ok(Json(ChatResponse { response: text }))
}
