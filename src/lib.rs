#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # roomstage
//!
//! AI room-staging pipeline: takes a photo of an empty or sparsely furnished
//! room and returns a photorealistic staged version in a chosen interior
//! style, generated by external image models.
//!
//! ## Pipeline
//!
//! 1. **Normalize**: apply EXIF orientation, re-encode as PNG, fit under the
//!    pixel ceiling and (best effort) the byte limit
//! 2. **Mask**: mark the floor-level region as editable and keep ceilings,
//!    windows and walls fixed, with a feathered edge
//! 3. **Generate**: an optional unmasked coherence pass, then a masked
//!    furniture pass, optionally guided by a structured staging plan from a
//!    text model
//! 4. **Validate**: reject invalid, suspiciously small or unchanged outputs
//!    and fall back to the edit API
//! 5. **Persist**: store the result and return its URL
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use roomstage::{StagingConfig, StagingInput, StagingPipeline};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = StagingConfig::from_env()?;
//! let pipeline = StagingPipeline::from_config(&config)?;
//!
//! let outcome = pipeline
//!     .generate_staged_design(
//!         StagingInput::new("/uploads/living-room.jpg", "scandinavian")
//!             .with_prompt("light oak, linen textures"),
//!     )
//!     .await;
//!
//! if outcome.success {
//!     println!("staged design at {}", outcome.image_url.unwrap_or_default());
//! } else {
//!     eprintln!("{:?}: {:?}", outcome.error_code, outcome.error_message);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Providers
//!
//! | Credential           | Role                                           |
//! |----------------------|------------------------------------------------|
//! | `STABILITY_API_KEY`  | Renderer: image-to-image and masked inpainting |
//! | `OPENAI_API_KEY`     | Edit API used as the fallback provider         |
//! | `GEMINI_API_KEY`     | Text model producing staging plans             |
//!
//! With no credentials every request fails with `MISSING_PROVIDER_KEY`,
//! unless mock fallback is allowed in a development environment.
//!
//! ### Feature Flags
//!
//! - `cli` (default): the `roomstage` binary and tracing subscriber setup
//! - `tracing-json`: JSON log output
//! - `tracing-files`: log to files through `tracing-appender`
//! - `webp-support`: WebP input decoding

pub mod config;
pub mod error;
pub mod mask;
pub mod normalize;
pub mod orchestrator;
pub mod pipeline;
pub mod planner;
pub mod prompts;
pub mod providers;
pub mod retry;
pub mod source;
pub mod storage;
pub mod style;
pub mod tracing_config;
pub mod types;
pub mod validation;

#[cfg(feature = "cli")]
pub mod cli;

pub use config::{Credentials, Environment, StagingConfig, StagingConfigBuilder};
pub use error::{ErrorCode, Result, StagingError};
pub use mask::{MaskConvention, MaskGenerator, MaskMargins, MaskRegion, MaskStats};
pub use normalize::{ImageNormalizer, NormalizationReport, NormalizerConfig};
pub use orchestrator::{GenerationOrchestrator, OrchestratorConfig, ProviderState};
pub use pipeline::{new_request_id, StagingPipeline};
pub use planner::{fallback_plan, PlanItem, PlanningAdvisor, StagingPlan};
pub use providers::{
    CredentialPresence, EditRequest, GeminiClient, ImageEditor, ImageRenderer, MockRenderer,
    OpenAiEditor, ProviderSet, RenderMode, RenderRequest, StabilityRenderer, TextGenerator,
};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use source::{DefaultImageSource, ImageRef, ImageSource};
pub use storage::{BlobStore, LocalBlobStore, MemoryBlobStore, Persister};
pub use style::Style;
pub use tracing_config::{events, spans, TracingConfig, TracingFormat, TracingOutput};
pub use types::{
    DesignHistory, DesignRecord, GenerationPass, GenerationRequest, GenerationResult,
    NormalizedImage, PlannerKind, ProviderKind, StagingInput, StagingOutcome,
};
pub use validation::{validate_output, InputFingerprint, OutputSource, ValidatedOutput};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, init_library_tracing};

pub use tokio_util::sync::CancellationToken;

/// Stage a room photo with a pipeline built from `config`
///
/// Convenience wrapper for one-off calls; services handling many requests
/// should build a [`StagingPipeline`] once and reuse it.
///
/// # Errors
/// Only configuration errors. Pipeline failures are reported in the
/// returned [`StagingOutcome`].
///
/// ```rust,no_run
/// use roomstage::{generate_staged_design, StagingConfig, StagingInput};
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = StagingConfig::builder()
///     .stability_api_key("sk-...")
///     .storage_dir("public")
///     .build()?;
/// let outcome = generate_staged_design(StagingInput::new("room.jpg", "modern"), &config).await?;
/// assert!(outcome.request_id.starts_with("req_"));
/// # Ok(())
/// # }
/// ```
pub async fn generate_staged_design(input: StagingInput, config: &StagingConfig) -> Result<StagingOutcome> {
    let pipeline = StagingPipeline::from_config(config)?;
    Ok(pipeline.generate_staged_design(input).await)
}
