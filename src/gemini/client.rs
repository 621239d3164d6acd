use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::{
    error::{RelayError, RelayResult},
    types::{upstream_message, GenerateContentRequest, GenerateContentResponse, ListModelsResponse},
    ChatBackend, ModelHandle,
};
use crate::config::GeminiConfig;

const API_VERSION: &str = "v1beta";
const API_KEY_HEADER: &str = "x-goog-api-key";
const MAX_MODEL_PAGES: usize = 50;

/// Gemini REST client. Built once at startup and shared through `Arc`.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    api_base: String,
    known_models: Vec<String>,
}

impl GeminiClient {
    pub fn new(config: &GeminiConfig) -> anyhow::Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            api_key: config.api_key.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            known_models: config.known_models.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{API_VERSION}/{path}", self.api_base)
    }

    // The URL stays in the logs; callers only see the error text.
    fn transport_error(url: &str, err: reqwest::Error) -> RelayError {
        warn!(url, error = %err, "backend request failed");
        RelayError::Transport(err.without_url())
    }

    async fn read_json<T: DeserializeOwned>(url: &str, response: Response) -> RelayResult<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| Self::transport_error(url, err))?;

        if !status.is_success() {
            warn!(url, status = status.as_u16(), "backend returned an error status");
            return Err(RelayError::Upstream {
                status: status.as_u16(),
                message: upstream_message(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| RelayError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ChatBackend for GeminiClient {
    fn resolve_model(&self, name: &str) -> RelayResult<ModelHandle> {
        ModelHandle::parse(name, &self.known_models)
    }

    async fn generate(&self, model: &ModelHandle, prompt: &str) -> RelayResult<String> {
        let url = self.url(&format!("{}:generateContent", model.resource_name()));
        debug!(model = model.id(), "sending generateContent");

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&GenerateContentRequest::user_prompt(prompt))
            .send()
            .await
            .map_err(|err| Self::transport_error(&url, err))?;

        let parsed: GenerateContentResponse = Self::read_json(&url, response).await?;
        parsed.text()
    }

    async fn list_models(&self) -> RelayResult<Vec<String>> {
        let url = self.url("models");
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_MODEL_PAGES {
            let mut request = self.client.get(&url).header(API_KEY_HEADER, &self.api_key);
            if let Some(token) = page_token.as_deref() {
                request = request.query(&[("pageToken", token)]);
            }

            let response = request
                .send()
                .await
                .map_err(|err| Self::transport_error(&url, err))?;
            let page: ListModelsResponse = Self::read_json(&url, response).await?;
            names.extend(page.models.into_iter().map(|m| m.name));

            match page.next_page_token {
                Some(token) if token.is_empty() => return Ok(names),
                Some(token) if page_token.as_deref() == Some(token.as_str()) => {
                    warn!(token, "backend repeated a page token, stopping model listing");
                    return Ok(names);
                }
                Some(token) => page_token = Some(token),
                None => return Ok(names),
            }
        }

        warn!(pages = MAX_MODEL_PAGES, "model listing hit the page limit");
        Ok(names)
    }
}
