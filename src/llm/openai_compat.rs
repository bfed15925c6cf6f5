//! Client for chat-completions compatible providers (Groq, Perplexity, `OpenAI`).

use super::classify::{from_response, from_transport};
use super::{
    ChatMessage, DiscoveredModel, GenerationProvider, GenerationRequest, LlmHttpConfig,
    ProviderError, build_http_client,
};
use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Chat-completions client.
pub struct OpenAiCompatibleClient {
    /// Provider name used in logs and attempt records.
    name: String,
    /// API base URL, without a trailing slash.
    base_url: String,
    /// Credential selected for this cycle.
    api_key: Option<SecretString>,
    /// Whether `response_format` may be sent.
    structured_output: bool,
    /// HTTP client.
    client: reqwest::blocking::Client,
}

impl OpenAiCompatibleClient {
    /// Groq API base.
    pub const GROQ_BASE_URL: &'static str = "https://api.groq.com/openai/v1";

    /// Perplexity API base.
    pub const PERPLEXITY_BASE_URL: &'static str = "https://api.perplexity.ai";

    /// Creates a client for the given base URL.
    #[must_use]
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            structured_output: true,
            client: build_http_client(LlmHttpConfig::default()),
        }
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: SecretString) -> Self {
        self.api_key = Some(key);
        self
    }

    /// Sets whether structured output may be requested.
    #[must_use]
    pub const fn with_structured_output(mut self, supported: bool) -> Self {
        self.structured_output = supported;
        self
    }

    /// Replaces the HTTP client configuration.
    #[must_use]
    pub fn with_http_config(mut self, config: LlmHttpConfig) -> Self {
        self.client = build_http_client(config);
        self
    }

    fn bearer(&self) -> Option<String> {
        self.api_key
            .as_ref()
            .map(|key| format!("Bearer {}", key.expose_secret()))
    }
}

impl GenerationProvider for OpenAiCompatibleClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_structured_output(&self) -> bool {
        self.structured_output
    }

    fn generate(
        &self,
        model: &str,
        request: &GenerationRequest,
        timeout: Duration,
    ) -> std::result::Result<String, ProviderError> {
        let bearer = self
            .bearer()
            .ok_or_else(|| ProviderError::fatal(format!("no credential for '{}'", self.name)))?;

        let body = ChatCompletionRequest {
            model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: (request.force_structured && self.structured_output)
                .then_some(ResponseFormat { kind: "json_object" }),
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", bearer)
            .timeout(timeout)
            .json(&body)
            .send()
            .map_err(|e| from_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let text = response.text().unwrap_or_default();
            return Err(from_response(status.as_u16(), retry_after.as_deref(), &text));
        }

        let completion: ChatCompletionResponse =
            response.json().map_err(|e| from_transport(&e))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| ProviderError::transient("empty completion").with_status(status.as_u16()))
    }

    fn list_models(&self) -> Result<Vec<DiscoveredModel>> {
        let unavailable = |cause: String| Error::DiscoveryUnavailable {
            provider: self.name.clone(),
            cause,
        };

        let bearer = self
            .bearer()
            .ok_or_else(|| unavailable("no credential".to_string()))?;

        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .header("Authorization", bearer)
            .timeout(Duration::from_secs(15))
            .send()
            .map_err(|e| unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(unavailable(format!(
                "models endpoint returned {}",
                response.status()
            )));
        }

        let listing: ModelListResponse = response.json().map_err(|e| unavailable(e.to_string()))?;

        let models: Vec<DiscoveredModel> = listing
            .data
            .into_iter()
            .filter(|entry| entry.active.unwrap_or(true))
            .map(|entry| DiscoveredModel {
                id: entry.id,
                tags: entry.owned_by.into_iter().collect(),
            })
            .collect();

        if models.is_empty() {
            return Err(unavailable("empty model listing".to_string()));
        }
        Ok(models)
    }
}

/// Request body for `/chat/completions`.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelListResponse {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
    #[serde(default)]
    owned_by: Option<String>,
    #[serde(default)]
    active: Option<bool>,
}
