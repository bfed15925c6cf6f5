//! Google Gemini `generateContent` client.

use super::classify::{from_response, from_transport};
use super::{
    DiscoveredModel, GenerationProvider, GenerationRequest, LlmHttpConfig, ProviderError, Role,
    build_http_client,
};
use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Gemini client.
pub struct GeminiClient {
    name: String,
    base_url: String,
    api_key: Option<SecretString>,
    client: reqwest::blocking::Client,
}

impl GeminiClient {
    /// Default API base.
    pub const DEFAULT_BASE_URL: &'static str = "https://generativelanguage.googleapis.com/v1beta";

    /// Creates a client named `name` against `base_url`.
    #[must_use]
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            client: build_http_client(LlmHttpConfig::default()),
        }
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, key: SecretString) -> Self {
        self.api_key = Some(key);
        self
    }

    /// Replaces the HTTP client configuration.
    #[must_use]
    pub fn with_http_config(mut self, config: LlmHttpConfig) -> Self {
        self.client = build_http_client(config);
        self
    }

    fn build_body(request: &GenerationRequest) -> GenerateContentRequest {
        let mut system_parts = Vec::new();
        let mut contents = Vec::new();

        for message in &request.messages {
            let part = Part {
                text: message.content.clone(),
            };
            match message.role {
                Role::System => system_parts.push(part),
                Role::User => contents.push(Content {
                    role: "user",
                    parts: vec![part],
                }),
                Role::Assistant => contents.push(Content {
                    role: "model",
                    parts: vec![part],
                }),
            }
        }

        GenerateContentRequest {
            contents,
            system_instruction: (!system_parts.is_empty()).then_some(SystemInstruction {
                parts: system_parts,
            }),
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
                response_mime_type: request.force_structured.then_some("application/json"),
            },
        }
    }
}

/// Strips the `models/` resource prefix from a listed model name.
fn model_id(name: &str) -> &str {
    name.strip_prefix("models/").unwrap_or(name)
}

impl GenerationProvider for GeminiClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports_structured_output(&self) -> bool {
        true
    }

    fn generate(
        &self,
        model: &str,
        request: &GenerationRequest,
        timeout: Duration,
    ) -> std::result::Result<String, ProviderError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| ProviderError::fatal(format!("no credential for '{}'", self.name)))?;

        let response = self
            .client
            .post(format!(
                "{}/models/{}:generateContent",
                self.base_url,
                model_id(model)
            ))
            .header("x-goog-api-key", api_key.expose_secret())
            .timeout(timeout)
            .json(&Self::build_body(request))
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

        let parsed: GenerateContentResponse = response.json().map_err(|e| from_transport(&e))?;
        let text = parsed.text();
        if text.trim().is_empty() {
            return Err(ProviderError::transient("empty candidate").with_status(status.as_u16()));
        }
        Ok(text)
    }

    fn list_models(&self) -> Result<Vec<DiscoveredModel>> {
        let unavailable = |cause: String| Error::DiscoveryUnavailable {
            provider: self.name.clone(),
            cause,
        };

        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| unavailable("no credential".to_string()))?;

        let response = self
            .client
            .get(format!("{}/models?pageSize=1000", self.base_url))
            .header("x-goog-api-key", api_key.expose_secret())
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
        let models = listing.into_generators();
        if models.is_empty() {
            return Err(unavailable("no generateContent models listed".to_string()));
        }
        Ok(models)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateContentResponse {
    /// Concatenated text of the first candidate's parts.
    fn text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct ModelListResponse {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

impl ModelListResponse {
    fn into_generators(self) -> Vec<DiscoveredModel> {
        self.models
            .into_iter()
            .filter(|m| {
                m.supported_generation_methods
                    .iter()
                    .any(|method| method == "generateContent")
            })
            .map(|m| DiscoveredModel {
                id: model_id(&m.name).to_string(),
                tags: m.supported_generation_methods,
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelEntry {
    name: String,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}
