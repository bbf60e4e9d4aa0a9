//! Gemini text model client used by the planner

use super::{error_message_from_body, TextGenerator};
use crate::error::{Result, StagingError};
use crate::retry::{retry_with_backoff, RetryPolicy};
use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// REST base of the Generative Language API
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Text model used when none is configured
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";

const PROVIDER: &str = "gemini";

/// Model name without the `models/` prefix
#[must_use]
pub fn to_short_name(name: &str) -> &str {
    name.strip_prefix("models/").unwrap_or(name)
}

/// Model name with the `models/` prefix
#[must_use]
pub fn to_full_name(name: &str) -> String {
    if name.starts_with("models/") {
        name.to_string()
    } else {
        format!("models/{}", name)
    }
}

/// A model advertised by the list endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub full_name: String,
    pub short_name: String,
    pub display_name: String,
    pub supported_generation_methods: Vec<String>,
}

impl ModelInfo {
    #[must_use]
    pub fn supports(&self, method: &str) -> bool {
        self.supported_generation_methods.iter().any(|m| m == method)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawModel {
    #[serde(default)]
    name: String,
    display_name: Option<String>,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<RawModel>,
}

/// Parse the list-models response, skipping unnamed entries
///
/// # Errors
/// - [`StagingError::ProviderRequest`] when the body is not the expected JSON
pub fn parse_models_response(body: &str) -> Result<Vec<ModelInfo>> {
    let response: ListModelsResponse = serde_json::from_str(body)
        .map_err(|e| StagingError::provider_request(PROVIDER, format!("unexpected model list: {}", e)))?;

    Ok(response
        .models
        .into_iter()
        .filter(|m| !to_short_name(&m.name).is_empty())
        .map(|m| {
            let short_name = to_short_name(&m.name).to_string();
            ModelInfo {
                full_name: to_full_name(&m.name),
                display_name: m.display_name.unwrap_or_else(|| short_name.clone()),
                short_name,
                supported_generation_methods: m.supported_generation_methods,
            }
        })
        .collect())
}

/// Concatenate the text parts of the first candidate
///
/// # Errors
/// - [`StagingError::Planner`] when the response holds no text (for example
///   when the prompt was blocked)
pub fn parse_generate_response(body: &str) -> Result<String> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| StagingError::planner(format!("unexpected generateContent response: {}", e)))?;

    let text: String = value
        .pointer("/candidates/0/content/parts")
        .and_then(serde_json::Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(serde_json::Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = value
            .pointer("/promptFeedback/blockReason")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("no text in response");
        return Err(StagingError::planner(format!("empty model response: {}", reason)));
    }
    Ok(text)
}

/// Request body for `generateContent`
#[must_use]
pub fn generate_request_body(prompt: &str, image_png: Option<&[u8]>) -> serde_json::Value {
    let mut parts = Vec::with_capacity(2);
    if let Some(image) = image_png {
        parts.push(json!({
            "inline_data": {
                "mime_type": "image/png",
                "data": base64::engine::general_purpose::STANDARD.encode(image),
            }
        }));
    }
    parts.push(json!({ "text": prompt }));
    json!({ "contents": [{ "parts": parts }] })
}

/// HTTP client for the Gemini REST API
#[derive(Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    text_model: String,
    base_url: String,
    retry: RetryPolicy,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("text_model", &self.text_model)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    #[must_use]
    pub fn new(client: reqwest::Client, api_key: String, text_model: &str) -> Self {
        let model = to_short_name(text_model.trim());
        Self {
            client,
            api_key,
            text_model: if model.is_empty() {
                DEFAULT_TEXT_MODEL.to_string()
            } else {
                model.to_string()
            },
            base_url: GEMINI_API_BASE.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// List models available to this key, retrying transient failures
    ///
    /// # Errors
    /// - [`StagingError::ProviderRequest`] on transport or HTTP failure
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let models = retry_with_backoff(&self.retry, "list models", || self.fetch_models()).await?;
        tracing::debug!(
            count = models.len(),
            first = ?models.iter().take(10).map(|m| m.short_name.as_str()).collect::<Vec<_>>(),
            "Listed Gemini models"
        );
        Ok(models)
    }

    async fn fetch_models(&self) -> Result<Vec<ModelInfo>> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| StagingError::network_error(PROVIDER, "list models", &e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StagingError::network_error(PROVIDER, "reading model list", &e))?;
        if !status.is_success() {
            return Err(StagingError::provider_status(
                PROVIDER,
                "list models",
                status.as_u16(),
                &error_message_from_body(&body),
            ));
        }
        parse_models_response(&body)
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    fn model_name(&self) -> &str {
        &self.text_model
    }

    async fn complete(&self, prompt: &str, image_png: Option<&[u8]>, request_id: &str) -> Result<String> {
        let url = format!(
            "{}/{}:generateContent",
            self.base_url,
            to_full_name(&self.text_model)
        );
        tracing::debug!(request_id = %request_id, model = %self.text_model, "Calling Gemini generateContent");

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&generate_request_body(prompt, image_png))
            .send()
            .await
            .map_err(|e| StagingError::network_error(PROVIDER, "generateContent", &e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StagingError::network_error(PROVIDER, "reading generateContent response", &e))?;
        if !status.is_success() {
            return Err(StagingError::provider_status(
                PROVIDER,
                "generateContent",
                status.as_u16(),
                &error_message_from_body(&body),
            ));
        }
        parse_generate_response(&body)
    }
}
