pub mod client;
pub mod error;
pub mod types;

use async_trait::async_trait;
use tracing::warn;

pub use client::GeminiClient;
pub use error::{RelayError, RelayResult};

/// Model used whenever the requested one cannot be resolved.
pub const FALLBACK_MODEL: &str = "gemini-1.0-pro";

const RESOURCE_PREFIX: &str = "models/";

/// A model identifier that passed resolution, stored without the `models/` prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelHandle {
    id: String,
}

impl ModelHandle {
    pub fn fallback() -> Self {
        Self {
            id: FALLBACK_MODEL.to_string(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn resource_name(&self) -> String {
        format!("{RESOURCE_PREFIX}{}", self.id)
    }

    /// Syntactic check plus an optional allow-list; never touches the network.
    pub fn parse(name: &str, known: &[String]) -> RelayResult<Self> {
        let trimmed = name.trim();
        let id = trimmed.strip_prefix(RESOURCE_PREFIX).unwrap_or(trimmed);

        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(RelayError::InvalidModel(name.to_string()));
        }

        if !known.is_empty()
            && !known
                .iter()
                .any(|k| k.strip_prefix(RESOURCE_PREFIX).unwrap_or(k) == id)
        {
            return Err(RelayError::UnknownModel(id.to_string()));
        }

        Ok(Self { id: id.to_string() })
    }
}

/// The hosted generative backend, shared by every request handler.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    fn resolve_model(&self, name: &str) -> RelayResult<ModelHandle>;

    async fn generate(&self, model: &ModelHandle, prompt: &str) -> RelayResult<String>;

    async fn list_models(&self) -> RelayResult<Vec<String>>;
}

/// Resolves `name`, substituting [`FALLBACK_MODEL`] when resolution fails.
pub fn resolve_or_fallback(backend: &dyn ChatBackend, name: &str) -> ModelHandle {
    match backend.resolve_model(name) {
        Ok(handle) => handle,
        Err(err) => {
            warn!(model = name, error = %err, "model not found, trying {FALLBACK_MODEL}");
            ModelHandle::fallback()
        }
    }
}
