//! External generation providers
//!
//! Each provider capability is a trait so the orchestrator can be driven by
//! real HTTP clients in production and by fakes in tests:
//!
//! - [`ImageRenderer`]: inpaint/image-to-image renderer (provider A)
//! - [`ImageEditor`]: image edit API with an alpha mask (provider B)
//! - [`TextGenerator`]: multimodal text model used for planning

pub mod gemini;
pub mod mock;
pub mod openai;
pub mod stability;

#[cfg(test)]
pub mod test_utils;

pub use gemini::{GeminiClient, ModelInfo};
pub use mock::MockRenderer;
pub use openai::OpenAiEditor;
pub use stability::StabilityRenderer;

use crate::config::StagingConfig;
use crate::error::Result;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// How the renderer should treat its input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// Whole-image transformation without a mask
    ImageToImage,
    /// Masked edit of the editable region only
    Inpaint,
}

impl RenderMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ImageToImage => "image-to-image",
            Self::Inpaint => "inpaint",
        }
    }
}

/// One call to an [`ImageRenderer`]
#[derive(Clone)]
pub struct RenderRequest {
    /// PNG bytes of the image to transform
    pub image: Vec<u8>,
    pub prompt: String,
    /// How far the output may drift from the input, in (0, 1]
    pub strength: f32,
    /// Encoded mask, required for [`RenderMode::Inpaint`]
    pub mask: Option<Vec<u8>>,
    pub mode: RenderMode,
    pub request_id: String,
}

impl fmt::Debug for RenderRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderRequest")
            .field("image_bytes", &self.image.len())
            .field("prompt_len", &self.prompt.len())
            .field("strength", &self.strength)
            .field("mask_bytes", &self.mask.as_ref().map(Vec::len))
            .field("mode", &self.mode)
            .field("request_id", &self.request_id)
            .finish()
    }
}

/// One call to an [`ImageEditor`]
#[derive(Clone)]
pub struct EditRequest {
    /// PNG bytes of the image to edit
    pub image: Vec<u8>,
    /// Alpha-convention mask PNG
    pub mask: Vec<u8>,
    pub prompt: String,
    pub request_id: String,
}

impl fmt::Debug for EditRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditRequest")
            .field("image_bytes", &self.image.len())
            .field("mask_bytes", &self.mask.len())
            .field("prompt_len", &self.prompt.len())
            .field("request_id", &self.request_id)
            .finish()
    }
}

/// Renderer that transforms an image, optionally within a mask
#[async_trait]
pub trait ImageRenderer: Send + Sync {
    /// Short provider name used in logs and errors
    fn name(&self) -> &str;

    /// Render and return the encoded output image
    ///
    /// # Errors
    /// Transport, HTTP status or payload errors from the provider.
    async fn render(&self, request: RenderRequest) -> Result<Vec<u8>>;
}

/// Edit API that fills the transparent region of a mask
#[async_trait]
pub trait ImageEditor: Send + Sync {
    fn name(&self) -> &str;

    /// Edit and return the encoded output image
    ///
    /// # Errors
    /// Transport, HTTP status or payload errors from the provider.
    async fn edit(&self, request: EditRequest) -> Result<Vec<u8>>;
}

/// Text model that may look at an attached image
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn model_name(&self) -> &str;

    /// Complete `prompt`, attaching `image_png` when present
    ///
    /// # Errors
    /// Transport, HTTP status or payload errors from the provider.
    async fn complete(&self, prompt: &str, image_png: Option<&[u8]>, request_id: &str) -> Result<String>;
}

/// Which provider credentials are available
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CredentialPresence {
    pub renderer: bool,
    pub editor: bool,
    pub planner: bool,
}

/// The provider clients available to one pipeline
///
/// A slot is `Some` exactly when its credential was configured, so provider
/// selection only has to look at which slots are filled.
#[derive(Clone)]
pub struct ProviderSet {
    pub renderer: Option<Arc<dyn ImageRenderer>>,
    pub editor: Option<Arc<dyn ImageEditor>>,
    pub planner: Option<Arc<dyn TextGenerator>>,
    pub mock: Arc<dyn ImageRenderer>,
}

impl fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSet")
            .field("renderer", &self.renderer.as_ref().map(|r| r.name().to_string()))
            .field("editor", &self.editor.as_ref().map(|e| e.name().to_string()))
            .field("planner", &self.planner.as_ref().map(|p| p.model_name().to_string()))
            .field("mock", &self.mock.name())
            .finish()
    }
}

impl Default for ProviderSet {
    fn default() -> Self {
        Self::empty()
    }
}

impl ProviderSet {
    /// No real providers; only the mock renderer
    #[must_use]
    pub fn empty() -> Self {
        Self {
            renderer: None,
            editor: None,
            planner: None,
            mock: Arc::new(MockRenderer::new()),
        }
    }

    /// Build HTTP clients for every configured credential
    ///
    /// # Errors
    /// - [`crate::StagingError::InvalidConfig`] when the HTTP client cannot be built
    pub fn from_config(config: &StagingConfig) -> Result<Self> {
        let client = build_http_client(config.request_timeout())?;
        let credentials = &config.credentials;

        let renderer = slot(credentials.stability_key()).map(|key| {
            Arc::new(StabilityRenderer::new(
                client.clone(),
                key.to_string(),
                config.guidance_scale,
            )) as Arc<dyn ImageRenderer>
        });
        let editor = slot(credentials.openai_key()).map(|key| {
            Arc::new(OpenAiEditor::new(client.clone(), key.to_string())) as Arc<dyn ImageEditor>
        });
        let planner = slot(credentials.gemini_key()).map(|key| {
            Arc::new(GeminiClient::new(
                client.clone(),
                key.to_string(),
                &config.gemini_text_model,
            )) as Arc<dyn TextGenerator>
        });

        Ok(Self {
            renderer,
            editor,
            planner,
            mock: Arc::new(MockRenderer::new()),
        })
    }

    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<dyn ImageRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    #[must_use]
    pub fn with_editor(mut self, editor: Arc<dyn ImageEditor>) -> Self {
        self.editor = Some(editor);
        self
    }

    #[must_use]
    pub fn with_planner(mut self, planner: Arc<dyn TextGenerator>) -> Self {
        self.planner = Some(planner);
        self
    }

    #[must_use]
    pub fn with_mock(mut self, mock: Arc<dyn ImageRenderer>) -> Self {
        self.mock = mock;
        self
    }

    #[must_use]
    pub fn presence(&self) -> CredentialPresence {
        CredentialPresence {
            renderer: self.renderer.is_some(),
            editor: self.editor.is_some(),
            planner: self.planner.is_some(),
        }
    }
}

/// Shared reqwest client with the configured per-request timeout
///
/// # Errors
/// - [`crate::StagingError::InvalidConfig`] when TLS initialisation fails
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("roomstage/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| crate::error::StagingError::invalid_config(format!("HTTP client: {}", e)))
}

/// An absent key leaves its provider slot empty
fn slot(key: Result<&str>) -> Option<&str> {
    key.map_err(|e| log::debug!("Provider slot left empty: {} ({})", e, e.code()))
        .ok()
}

/// Pull a human-readable message out of a provider error body
pub(crate) fn error_message_from_body(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.trim().to_string();
    };
    let candidates = [
        value.pointer("/error/message"),
        value.pointer("/message"),
        value.pointer("/errors/0"),
        value.pointer("/error"),
    ];
    let message = candidates
        .into_iter()
        .flatten()
        .find_map(|v| v.as_str().map(str::to_string));
    message.unwrap_or_else(|| body.trim().to_string())
}
