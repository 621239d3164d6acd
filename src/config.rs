use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::gemini::ModelHandle;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-1.0-pro";
pub const DEFAULT_KNOWN_MODELS: &[&str] = &["gemini-pro", "gemini-1.0-pro", "gemini-1.5-flash"];

/// Process configuration, read once from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub gemini: GeminiConfig,
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub api_base: String,
    pub default_model: String,
    pub known_models: Vec<String>,
    pub timeout: Option<Duration>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| dotenvy::var(key).ok())
    }

    /// Builds the config from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let port = match lookup("PORT") {
            Some(raw) => parse_port(&raw)?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            port,
            gemini: GeminiConfig::from_lookup(lookup)?,
        })
    }
}

impl GeminiConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| dotenvy::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = lookup("GEMINI_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .context("GEMINI_API_KEY must be set")?;

        let api_base = lookup("GEMINI_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        let default_model =
            lookup("GEMINI_DEFAULT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let mut known_models = lookup("GEMINI_KNOWN_MODELS")
            .map(|raw| parse_model_list(&raw))
            .unwrap_or_else(default_known_models);

        let default_handle = ModelHandle::parse(&default_model, &[])
            .context("GEMINI_DEFAULT_MODEL is not a valid model identifier")?;
        // The configured default is always allowed, even when the list omits it.
        if !known_models.is_empty() && ModelHandle::parse(&default_model, &known_models).is_err() {
            known_models.push(default_handle.id().to_string());
        }

        let timeout = match lookup("GEMINI_TIMEOUT_SECS") {
            Some(raw) => Some(parse_timeout(&raw)?),
            None => None,
        };

        Ok(Self {
            api_key,
            api_base,
            default_model: default_handle.id().to_string(),
            known_models,
            timeout,
        })
    }

    /// Config with defaults for everything except the credential.
    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            known_models: default_known_models(),
            timeout: None,
        }
    }
}

pub fn default_known_models() -> Vec<String> {
    DEFAULT_KNOWN_MODELS.iter().map(|m| m.to_string()).collect()
}

fn parse_port(raw: &str) -> Result<u16> {
    raw.trim()
        .parse::<u16>()
        .with_context(|| format!("PORT must be a valid port number, got {raw:?}"))
}

fn parse_timeout(raw: &str) -> Result<Duration> {
    let secs = raw
        .trim()
        .parse::<u64>()
        .with_context(|| format!("GEMINI_TIMEOUT_SECS must be a whole number, got {raw:?}"))?;
    if secs == 0 {
        bail!("GEMINI_TIMEOUT_SECS must be greater than zero");
    }
    Ok(Duration::from_secs(secs))
}

fn parse_model_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect()
}
