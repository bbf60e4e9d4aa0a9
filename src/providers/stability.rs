//! Stability AI inpainting renderer (provider A)

use super::{error_message_from_body, ImageRenderer, RenderRequest};
use crate::error::{Result, StagingError};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};

/// Default inpaint endpoint
pub const STABILITY_INPAINT_URL: &str = "https://api.stability.ai/v2beta/stable-image/edit/inpaint";

/// Output edge length requested from the renderer
pub const OUTPUT_SIZE: u32 = 1024;

const PROVIDER: &str = "stability";

/// HTTP client for the Stability inpaint endpoint
#[derive(Clone)]
pub struct StabilityRenderer {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    guidance_scale: f32,
}

impl std::fmt::Debug for StabilityRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StabilityRenderer")
            .field("endpoint", &self.endpoint)
            .field("guidance_scale", &self.guidance_scale)
            .finish_non_exhaustive()
    }
}

impl StabilityRenderer {
    #[must_use]
    pub fn new(client: reqwest::Client, api_key: String, guidance_scale: f32) -> Self {
        Self {
            client,
            api_key,
            endpoint: STABILITY_INPAINT_URL.to_string(),
            guidance_scale,
        }
    }

    /// Point the client at a different endpoint
    #[must_use]
    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Ordered text fields of the multipart body, files excluded
    ///
    /// The endpoint reads fields positionally in places, so the order is
    /// image, prompt, strength, guidance_scale, mask, output_format, mode,
    /// width, height.
    #[must_use]
    pub fn text_fields(&self, request: &RenderRequest) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("prompt", request.prompt.clone()),
            ("strength", request.strength.to_string()),
        ];
        if self.guidance_scale > 0.0 {
            fields.push(("guidance_scale", self.guidance_scale.to_string()));
        }
        fields.push(("output_format", "png".to_string()));
        fields.push(("mode", request.mode.as_str().to_string()));
        fields.push(("width", OUTPUT_SIZE.to_string()));
        fields.push(("height", OUTPUT_SIZE.to_string()));
        fields
    }

    fn build_form(&self, request: RenderRequest) -> Result<Form> {
        let text = self.text_fields(&request);
        let png_part = |bytes: Vec<u8>, name: &'static str| {
            Part::bytes(bytes)
                .file_name(name)
                .mime_str("image/png")
                .map_err(|e| StagingError::internal(format!("multipart part: {}", e)))
        };

        let mut form = Form::new().part("image", png_part(request.image, "room.png")?);
        for (name, value) in &text {
            if *name == "output_format" {
                if let Some(mask) = request.mask.clone() {
                    form = form.part("mask", png_part(mask, "mask.png")?);
                }
            }
            form = form.text(*name, value.clone());
        }
        Ok(form)
    }
}

#[async_trait]
impl ImageRenderer for StabilityRenderer {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn render(&self, request: RenderRequest) -> Result<Vec<u8>> {
        let request_id = request.request_id.clone();
        let mode = request.mode;
        let strength = request.strength;
        let has_mask = request.mask.is_some();
        let form = self.build_form(request)?;

        tracing::info!(
            request_id = %request_id,
            mode = mode.as_str(),
            strength,
            has_mask,
            "Calling Stability renderer"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "image/*")
            .multipart(form)
            .send()
            .await
            .map_err(|e| StagingError::network_error(PROVIDER, "inpaint request", &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StagingError::provider_status(
                PROVIDER,
                "inpaint",
                status.as_u16(),
                &error_message_from_body(&body),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| StagingError::network_error(PROVIDER, "reading inpaint response", &e))?;

        tracing::debug!(request_id = %request_id, bytes = bytes.len(), "Stability response received");
        Ok(bytes.to_vec())
    }
}
