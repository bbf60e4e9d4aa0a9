//! OpenAI image edit client (provider B)

use super::{error_message_from_body, EditRequest, ImageEditor};
use crate::error::{Result, StagingError};
use crate::mask::encode_rgba_png;
use crate::retry::{retry_with_backoff, RetryPolicy};
use async_trait::async_trait;
use base64::Engine as _;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

/// Default image edit endpoint
pub const OPENAI_EDITS_URL: &str = "https://api.openai.com/v1/images/edits";

/// The edit API only produces square outputs
pub const OUTPUT_SIZE: &str = "1024x1024";

const PROVIDER: &str = "openai";

/// Image payload returned by the edit API
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditPayload {
    Url(String),
    Base64(String),
}

#[derive(Debug, Deserialize)]
struct EditResponse {
    #[serde(default)]
    data: Vec<EditDatum>,
}

#[derive(Debug, Deserialize)]
struct EditDatum {
    url: Option<String>,
    b64_json: Option<String>,
}

/// Extract the first image payload from an edit API response body
///
/// # Errors
/// - [`StagingError::ProviderRequest`] when the body is not the expected JSON
///   or carries no image
pub fn parse_edit_response(body: &str) -> Result<EditPayload> {
    let response: EditResponse = serde_json::from_str(body)
        .map_err(|e| StagingError::provider_request(PROVIDER, format!("unexpected response: {}", e)))?;
    let first = response
        .data
        .into_iter()
        .next()
        .ok_or_else(|| StagingError::provider_request(PROVIDER, "response contained no images"))?;

    match (first.url, first.b64_json) {
        (Some(url), _) if !url.is_empty() => Ok(EditPayload::Url(url)),
        (_, Some(b64)) if !b64.is_empty() => Ok(EditPayload::Base64(b64)),
        _ => Err(StagingError::provider_request(
            PROVIDER,
            "response item has neither url nor b64_json",
        )),
    }
}

/// The edit API requires an alpha channel on the input
///
/// # Errors
/// - [`StagingError::Normalization`] when the input cannot be decoded
pub fn ensure_rgba_png(png: &[u8]) -> Result<Vec<u8>> {
    let image = image::load_from_memory(png)
        .map_err(|e| StagingError::normalization_stage_error("rgba conversion", &e.to_string()))?;
    if image.color() == image::ColorType::Rgba8 {
        return Ok(png.to_vec());
    }
    encode_rgba_png(&image.to_rgba8())
}

/// HTTP client for the OpenAI image edit endpoint
#[derive(Clone)]
pub struct OpenAiEditor {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    retry: RetryPolicy,
}

impl std::fmt::Debug for OpenAiEditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEditor")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl OpenAiEditor {
    #[must_use]
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self {
            client,
            api_key,
            endpoint: OPENAI_EDITS_URL.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn build_form(image_rgba: Vec<u8>, mask: Vec<u8>, prompt: String) -> Result<Form> {
        let png_part = |bytes: Vec<u8>, name: &'static str| {
            Part::bytes(bytes)
                .file_name(name)
                .mime_str("image/png")
                .map_err(|e| StagingError::internal(format!("multipart part: {}", e)))
        };
        Ok(Form::new()
            .part("image", png_part(image_rgba, "room.png")?)
            .part("mask", png_part(mask, "mask.png")?)
            .text("prompt", prompt)
            .text("n", "1")
            .text("size", OUTPUT_SIZE))
    }

    /// Turn an edit payload into image bytes
    async fn resolve(&self, payload: EditPayload, request_id: &str) -> Result<Vec<u8>> {
        match payload {
            EditPayload::Base64(data) => base64::engine::general_purpose::STANDARD
                .decode(data.trim())
                .map_err(|e| StagingError::provider_request(PROVIDER, format!("invalid b64_json: {}", e))),
            EditPayload::Url(url) => {
                tracing::debug!(request_id = %request_id, "Downloading edit result");
                retry_with_backoff(&self.retry, "edit result download", || self.download(&url)).await
            },
        }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| StagingError::network_error(PROVIDER, "result download", &e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(StagingError::provider_status(
                PROVIDER,
                "result download",
                status.as_u16(),
                "",
            ));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| StagingError::network_error(PROVIDER, "reading result download", &e))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl ImageEditor for OpenAiEditor {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn edit(&self, request: EditRequest) -> Result<Vec<u8>> {
        let EditRequest {
            image,
            mask,
            prompt,
            request_id,
        } = request;

        let image_rgba = tokio::task::spawn_blocking(move || ensure_rgba_png(&image))
            .await
            .map_err(|e| StagingError::internal(format!("rgba conversion task: {}", e)))??;

        tracing::info!(
            request_id = %request_id,
            image_bytes = image_rgba.len(),
            mask_bytes = mask.len(),
            prompt_len = prompt.len(),
            "Calling OpenAI image edit"
        );

        let form = Self::build_form(image_rgba, mask, prompt)?;
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| StagingError::network_error(PROVIDER, "edit request", &e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StagingError::network_error(PROVIDER, "reading edit response", &e))?;
        if !status.is_success() {
            return Err(StagingError::provider_status(
                PROVIDER,
                "images/edits",
                status.as_u16(),
                &error_message_from_body(&body),
            ));
        }

        let payload = parse_edit_response(&body)?;
        self.resolve(payload, &request_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GenericImageView, RgbImage};

    #[test]
    fn test_parse_url_response() {
        let payload =
            parse_edit_response(r#"{"created":1,"data":[{"url":"https://cdn.example/x.png"}]}"#).unwrap();
        assert_eq!(payload, EditPayload::Url("https://cdn.example/x.png".to_string()));
    }

    #[test]
    fn test_parse_b64_response() {
        let payload = parse_edit_response(r#"{"data":[{"b64_json":"iVBORw0KGgo="}]}"#).unwrap();
        assert_eq!(payload, EditPayload::Base64("iVBORw0KGgo=".to_string()));
    }

    #[test]
    fn test_parse_empty_response_fails() {
        assert!(parse_edit_response(r#"{"data":[]}"#).is_err());
        assert!(parse_edit_response(r#"{"data":[{}]}"#).is_err());
        assert!(parse_edit_response("not json").is_err());
    }

    #[tokio::test]
    async fn test_resolve_base64_payload() {
        let editor = OpenAiEditor::new(reqwest::Client::new(), "key".to_string());
        let bytes = editor
            .resolve(EditPayload::Base64("iVBORw0KGgo=".to_string()), "req")
            .await
            .unwrap();
        assert_eq!(bytes, crate::validation::PNG_SIGNATURE.to_vec());
    }

    #[test]
    fn test_ensure_rgba_adds_alpha() {
        let mut png = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(8, 6))
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let rgba = ensure_rgba_png(&png).unwrap();
        let decoded = image::load_from_memory(&rgba).unwrap();
        assert_eq!(decoded.color(), image::ColorType::Rgba8);
        assert_eq!(decoded.dimensions(), (8, 6));
    }

    #[test]
    fn test_form_builds() {
        assert!(OpenAiEditor::build_form(vec![1], vec![2], "prompt".to_string()).is_ok());
    }
}
