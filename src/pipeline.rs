//! The staging pipeline: image reference in, persisted design out
//!
//! [`StagingPipeline::generate_staged_design`] never returns an error. Every
//! failure becomes a [`StagingOutcome`] with `success: false`, a stable error
//! code and the request id used in the logs.

use crate::config::StagingConfig;
use crate::error::{Result, StagingError};
use crate::normalize::ImageNormalizer;
use crate::orchestrator::{GenerationOrchestrator, OrchestratorConfig, ProviderState};
use crate::providers::{build_http_client, ProviderSet};
use crate::source::{DefaultImageSource, ImageRef, ImageSource};
use crate::storage::{BlobStore, LocalBlobStore, Persister};
use crate::style::Style;
use crate::tracing_config::{events, spans};
use crate::types::{DesignRecord, GenerationRequest, GenerationResult, NormalizedImage, StagingInput, StagingOutcome};
use rand::Rng;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// New request id of the form `req_<millis>_<8 hex>`
#[must_use]
pub fn new_request_id() -> String {
    format!(
        "req_{}_{:08x}",
        chrono::Utc::now().timestamp_millis(),
        rand::thread_rng().gen::<u32>()
    )
}

/// End-to-end staging pipeline
#[derive(Clone)]
pub struct StagingPipeline {
    source: Arc<dyn ImageSource>,
    normalizer: ImageNormalizer,
    orchestrator: GenerationOrchestrator,
    persister: Persister,
}

impl std::fmt::Debug for StagingPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagingPipeline")
            .field("normalizer", &self.normalizer)
            .field("orchestrator", &self.orchestrator)
            .finish_non_exhaustive()
    }
}

impl StagingPipeline {
    /// Build the production pipeline: HTTP providers for every configured
    /// key, filesystem/HTTP image source and local blob storage
    ///
    /// # Errors
    /// - [`StagingError::InvalidConfig`] when the configuration is invalid or
    ///   the HTTP client cannot be built
    pub fn from_config(config: &StagingConfig) -> Result<Self> {
        config.validate()?;
        let providers = ProviderSet::from_config(config)?;
        let source = DefaultImageSource::new(
            build_http_client(config.request_timeout())?,
            config.public_asset_root.clone(),
        );
        let store = LocalBlobStore::new(config.storage_dir.clone(), config.public_base_url.clone());
        Ok(Self::with_components(
            config,
            Arc::new(source),
            providers,
            Arc::new(store),
        ))
    }

    /// Assemble a pipeline from explicit collaborators
    #[must_use]
    pub fn with_components(
        config: &StagingConfig,
        source: Arc<dyn ImageSource>,
        providers: ProviderSet,
        store: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            source,
            normalizer: ImageNormalizer::new(config.normalizer),
            orchestrator: GenerationOrchestrator::new(OrchestratorConfig::from(config), providers),
            persister: Persister::new(store),
        }
    }

    #[must_use]
    pub fn orchestrator(&self) -> &GenerationOrchestrator {
        &self.orchestrator
    }

    #[must_use]
    pub fn provider_state(&self) -> ProviderState {
        self.orchestrator.state()
    }

    /// Stage a room photo and persist the result
    pub async fn generate_staged_design(&self, input: StagingInput) -> StagingOutcome {
        self.generate_with_cancellation(input, CancellationToken::new())
            .await
    }

    /// Like [`Self::generate_staged_design`], stopping early once `cancel` fires
    pub async fn generate_with_cancellation(
        &self,
        input: StagingInput,
        cancel: CancellationToken,
    ) -> StagingOutcome {
        let request_id = new_request_id();
        let span = spans::request(&request_id, input.style.trim());
        let started = instant::Instant::now();

        let outcome = async {
            match self.run(&input, &cancel, &request_id).await {
                Ok((result, design)) => {
                    tracing::info!(
                        provider = %result.provider,
                        planner = %result.planner,
                        fallback_used = result.fallback_used,
                        low_confidence = result.low_confidence,
                        passes = ?result.passes,
                        url = %design.image_url,
                        "Staging succeeded"
                    );
                    StagingOutcome::succeeded(request_id.clone(), &result, design)
                },
                Err(error) => {
                    tracing::error!(
                        code = %error.code(),
                        retryable = error.is_retryable(),
                        error = %error,
                        "Staging failed"
                    );
                    StagingOutcome::failed(request_id.clone(), &error)
                },
            }
        }
        .instrument(span)
        .await;

        events::stage_timing("staging request", started.elapsed().as_millis() as u64);
        outcome
    }

    async fn run(
        &self,
        input: &StagingInput,
        cancel: &CancellationToken,
        request_id: &str,
    ) -> Result<(GenerationResult, DesignRecord)> {
        let style = Style::parse(&input.style).ok_or(StagingError::MissingStyle)?;
        let image_ref = ImageRef::parse(&input.image_ref)?;

        // Refuse before touching the network or filesystem
        let state = self.orchestrator.preflight()?;
        tracing::debug!(state = %state, image = %image_ref, "Request accepted");

        let raw = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(StagingError::Cancelled),
            loaded = self.source.load(&image_ref, request_id) => loaded?,
        };

        let image = self.normalize(raw).await?;

        let request = GenerationRequest {
            style: style.clone(),
            prompt: crate::prompts::clean_user_prompt(input.prompt.as_deref()),
            more_furniture: input.more_furniture,
            image,
        };
        let result = self.orchestrator.generate(&request, cancel, request_id).await?;

        let design = self
            .persister
            .persist_design(&result, &style, request_id)
            .instrument(spans::persist(style.slug()))
            .await?;
        Ok((result, design))
    }

    async fn normalize(&self, raw: Vec<u8>) -> Result<NormalizedImage> {
        let normalizer = self.normalizer;
        let span = spans::normalization(raw.len());
        let (image, report) = tokio::task::spawn_blocking(move || {
            let _entered = span.enter();
            normalizer.normalize_with_report(&raw)
        })
        .await
        .map_err(|e| StagingError::internal(format!("normalization task failed: {}", e)))??;

        tracing::info!(
            source_format = report.source_format.as_deref().unwrap_or("unknown"),
            source_bytes = report.source_bytes,
            orientation = report.orientation,
            width = image.width,
            height = image.height,
            bytes = image.bytes.len(),
            shrink_attempts = report.shrink_attempts,
            within_byte_limit = report.within_byte_limit,
            "Image normalized"
        );
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use crate::error::ErrorCode;
    use crate::providers::test_utils::{noise_png, FakeBehavior, FakeRenderer};
    use crate::storage::MemoryBlobStore;
    use crate::types::ProviderKind;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// In-memory image source recording every load
    #[derive(Default)]
    struct StaticSource {
        bytes: Vec<u8>,
        loads: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ImageSource for StaticSource {
        async fn load(&self, image: &ImageRef, _request_id: &str) -> Result<Vec<u8>> {
            self.loads.lock().unwrap().push(image.to_string());
            Ok(self.bytes.clone())
        }
    }

    fn pipeline(
        config: &StagingConfig,
        source: Arc<StaticSource>,
        providers: ProviderSet,
    ) -> (StagingPipeline, MemoryBlobStore) {
        let store = MemoryBlobStore::new("https://cdn.example.com");
        let pipeline = StagingPipeline::with_components(config, source, providers, Arc::new(store.clone()));
        (pipeline, store)
    }

    #[test]
    fn test_request_id_format() {
        let id = new_request_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "req");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 8);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_missing_style_and_image() {
        let source = Arc::new(StaticSource::default());
        let config = StagingConfig::default();
        let (pipeline, _) = pipeline(&config, source.clone(), ProviderSet::empty());

        let outcome = pipeline
            .generate_staged_design(StagingInput::new("/uploads/a.jpg", "  "))
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.error_code, Some(ErrorCode::MissingStyle));

        let outcome = pipeline
            .generate_staged_design(StagingInput::new("blob:http://localhost/1", "modern"))
            .await;
        assert_eq!(outcome.error_code, Some(ErrorCode::MissingImage));
        assert!(!outcome.retryable);
        assert!(source.loads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_successful_run_persists_design() {
        let source = Arc::new(StaticSource {
            bytes: noise_png(320, 240, 3),
            ..StaticSource::default()
        });
        let config = StagingConfig::builder().two_pass(false).build().unwrap();
        let providers = ProviderSet::empty()
            .with_renderer(Arc::new(FakeRenderer::new(FakeBehavior::Succeed)));
        let (pipeline, store) = pipeline(&config, source, providers);

        let outcome = pipeline
            .generate_staged_design(StagingInput::new("/uploads/room.png", "Modern"))
            .await;

        assert!(outcome.success, "{:?}", outcome.error_message);
        assert_eq!(outcome.provider_used, Some(ProviderKind::Stability));
        let url = outcome.image_url.unwrap();
        assert!(url.starts_with("https://cdn.example.com/generated/design-"));
        assert!(url.ends_with("-modern.png"));
        assert_eq!(store.paths().len(), 1);
        assert!(outcome.request_id.starts_with("req_"));
    }

    #[tokio::test]
    async fn test_mock_in_development_only() {
        let source = Arc::new(StaticSource {
            bytes: noise_png(64, 48, 9),
            ..StaticSource::default()
        });
        let config = StagingConfig::builder()
            .environment(Environment::Development)
            .allow_mock_fallback(true)
            .build()
            .unwrap();
        let (pipeline, _) = pipeline(&config, source, ProviderSet::empty());

        let outcome = pipeline
            .generate_staged_design(StagingInput::new("/uploads/room.png", "scandinavian"))
            .await;
        assert!(outcome.success, "{:?}", outcome.error_message);
        assert_eq!(outcome.provider_used, Some(ProviderKind::Mock));
        assert!(outcome.fallback_used);
        assert!(outcome.low_confidence);
    }

    #[tokio::test]
    async fn test_cancelled_before_load() {
        let source = Arc::new(StaticSource::default());
        let config = StagingConfig::builder().force_mock(true).build().unwrap();
        let (pipeline, _) = pipeline(&config, source.clone(), ProviderSet::empty());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = pipeline
            .generate_with_cancellation(StagingInput::new("/uploads/a.png", "modern"), cancel)
            .await;
        assert_eq!(outcome.error_code, Some(ErrorCode::Cancelled));
        assert!(source.loads.lock().unwrap().is_empty());
    }
}
