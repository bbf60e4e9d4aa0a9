//! Generation orchestration
//!
//! Chooses a provider path from the configured credentials, runs the one- or
//! two-pass render, validates every provider output and falls back to the
//! edit API (or, in development, the mock renderer) when the renderer path
//! fails.

use crate::config::StagingConfig;
use crate::error::{Result, StagingError};
use crate::mask::{write_debug_artifacts, MaskConvention, MaskGenerator, MaskMargins};
use crate::planner::{fallback_plan, PlanningAdvisor, StagingPlan};
use crate::prompts::{
    coherence_prompt, edit_prompt, planned_staging_prompt, unplanned_staging_prompt, PromptSet,
};
use crate::providers::{
    CredentialPresence, EditRequest, ImageEditor, ImageRenderer, ProviderSet, RenderMode,
    RenderRequest, TextGenerator,
};
use crate::tracing_config::{events, spans};
use crate::types::{GenerationPass, GenerationRequest, GenerationResult, PlannerKind, ProviderKind};
use crate::validation::{check_unchanged_hash, validate_output, InputFingerprint, OutputSource};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Which provider path a request takes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderState {
    /// No usable credentials
    NoProvider,
    /// Renderer with a planning text model
    ProviderAWithPlanner,
    /// Renderer without planning
    ProviderANoPlanner,
    /// Edit API only
    ProviderBFallback,
    /// Local placeholder renderer
    Mock,
}

impl ProviderState {
    /// Select a path; the first matching rule wins
    #[must_use]
    pub fn select(presence: CredentialPresence, mock_override: bool) -> Self {
        if mock_override {
            Self::Mock
        } else if presence.renderer && presence.planner {
            Self::ProviderAWithPlanner
        } else if presence.renderer {
            Self::ProviderANoPlanner
        } else if presence.editor {
            Self::ProviderBFallback
        } else {
            Self::NoProvider
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoProvider => "no-provider",
            Self::ProviderAWithPlanner => "renderer+planner",
            Self::ProviderANoPlanner => "renderer",
            Self::ProviderBFallback => "editor",
            Self::Mock => "mock",
        }
    }
}

impl std::fmt::Display for ProviderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Orchestrator settings, derived from [`StagingConfig`]
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    pub two_pass: bool,
    pub pass1_strength: f32,
    pub pass2_strength: f32,
    pub single_pass_strength: f32,
    pub renderer_mask_convention: MaskConvention,
    pub render_timeout: Duration,
    pub force_mock: bool,
    pub mock_fallback_permitted: bool,
    /// Where mask debug artifacts go, when enabled
    pub debug_artifact_dir: Option<PathBuf>,
    pub mask_margins: MaskMargins,
    pub feather_radius: f32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from(&StagingConfig::default())
    }
}

impl From<&StagingConfig> for OrchestratorConfig {
    fn from(config: &StagingConfig) -> Self {
        Self {
            two_pass: config.two_pass,
            pass1_strength: config.pass1_strength,
            pass2_strength: config.pass2_strength,
            single_pass_strength: config.single_pass_strength,
            renderer_mask_convention: config.renderer_mask_convention,
            render_timeout: config.render_timeout(),
            force_mock: config.force_mock,
            mock_fallback_permitted: config.mock_fallback_permitted(),
            debug_artifact_dir: config
                .debug_artifacts_enabled()
                .then(|| config.debug_artifact_dir.clone()),
            mask_margins: config.mask_margins,
            feather_radius: config.feather_radius,
        }
    }
}

/// Output of the renderer path before it is wrapped in a result
struct RenderOutcome {
    bytes: Vec<u8>,
    planner: PlannerKind,
    passes: Vec<GenerationPass>,
    low_confidence: bool,
}

/// Drives the providers for one generation request
#[derive(Debug, Clone)]
pub struct GenerationOrchestrator {
    config: OrchestratorConfig,
    providers: ProviderSet,
    masks: MaskGenerator,
}

impl GenerationOrchestrator {
    #[must_use]
    pub fn new(config: OrchestratorConfig, providers: ProviderSet) -> Self {
        let masks = MaskGenerator::new(config.mask_margins, config.feather_radius);
        Self {
            config,
            providers,
            masks,
        }
    }

    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    #[must_use]
    pub fn providers(&self) -> &ProviderSet {
        &self.providers
    }

    /// Provider path selected for the current credentials
    #[must_use]
    pub fn state(&self) -> ProviderState {
        ProviderState::select(self.providers.presence(), self.config.force_mock)
    }

    /// Check a request could run at all, before any I/O
    ///
    /// # Errors
    /// - `MISSING_PROVIDER_KEY` when no provider is configured and mock
    ///   fallback is not permitted
    pub fn preflight(&self) -> Result<ProviderState> {
        let state = self.state();
        if state == ProviderState::NoProvider && !self.config.mock_fallback_permitted {
            return Err(StagingError::missing_provider_key());
        }
        Ok(state)
    }

    /// Generate a staged image for a normalized room photo
    ///
    /// # Errors
    /// - `MISSING_PROVIDER_KEY` (see [`Self::preflight`])
    /// - [`StagingError::Cancelled`] as soon as `cancel` fires
    /// - `GENERATION_FAILED` carrying the last cause once every permitted
    ///   path failed
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
        request_id: &str,
    ) -> Result<GenerationResult> {
        let state = self.preflight()?;
        if cancel.is_cancelled() {
            return Err(StagingError::Cancelled);
        }
        tracing::info!(
            request_id = %request_id,
            state = %state,
            two_pass = self.config.two_pass,
            width = request.image.width,
            height = request.image.height,
            "Starting generation"
        );

        match state {
            ProviderState::Mock | ProviderState::NoProvider => {
                self.run_mock(request, cancel, request_id).await
            },
            ProviderState::ProviderAWithPlanner | ProviderState::ProviderANoPlanner => {
                let Some(renderer) = &self.providers.renderer else {
                    return Err(StagingError::internal("renderer selected but not configured"));
                };
                let planner = self
                    .providers
                    .planner
                    .as_ref()
                    .filter(|_| state == ProviderState::ProviderAWithPlanner);

                match self
                    .run_renderer(renderer, planner, request, cancel, request_id)
                    .await
                {
                    Ok(outcome) => Ok(GenerationResult {
                        provider: ProviderKind::Stability,
                        planner: outcome.planner,
                        bytes: outcome.bytes,
                        fallback_used: false,
                        passes: outcome.passes,
                        low_confidence: outcome.low_confidence,
                    }),
                    Err(StagingError::Cancelled) => Err(StagingError::Cancelled),
                    Err(error) => self.after_renderer_failure(request, error, cancel, request_id).await,
                }
            },
            ProviderState::ProviderBFallback => {
                let Some(editor) = &self.providers.editor else {
                    return Err(StagingError::internal("editor selected but not configured"));
                };
                match self.run_editor(editor, request, false, cancel, request_id).await {
                    Ok(result) => Ok(result),
                    Err(StagingError::Cancelled) => Err(StagingError::Cancelled),
                    Err(error) => self.last_resort(request, error, cancel, request_id).await,
                }
            },
        }
    }

    async fn after_renderer_failure(
        &self,
        request: &GenerationRequest,
        error: StagingError,
        cancel: &CancellationToken,
        request_id: &str,
    ) -> Result<GenerationResult> {
        let Some(editor) = &self.providers.editor else {
            return self.last_resort(request, error, cancel, request_id).await;
        };
        events::fallback_engaged("renderer", &error, editor.name());

        match self.run_editor(editor, request, true, cancel, request_id).await {
            Ok(result) => Ok(result),
            Err(StagingError::Cancelled) => Err(StagingError::Cancelled),
            Err(editor_error) => self.last_resort(request, editor_error, cancel, request_id).await,
        }
    }

    /// Mock when permitted, otherwise the exhaustion error
    async fn last_resort(
        &self,
        request: &GenerationRequest,
        error: StagingError,
        cancel: &CancellationToken,
        request_id: &str,
    ) -> Result<GenerationResult> {
        if self.config.mock_fallback_permitted {
            events::fallback_engaged("providers", &error, "mock");
            return self.run_mock(request, cancel, request_id).await;
        }
        tracing::error!(request_id = %request_id, error = %error, "All generation paths failed");
        Err(StagingError::generation_exhausted(&error))
    }

    async fn run_renderer(
        &self,
        renderer: &Arc<dyn ImageRenderer>,
        planner: Option<&Arc<dyn TextGenerator>>,
        request: &GenerationRequest,
        cancel: &CancellationToken,
        request_id: &str,
    ) -> Result<RenderOutcome> {
        let prompts = PromptSet::resolve(&request.style, request.prompt.as_deref());
        let original = &request.image.bytes;
        let mut low_confidence = false;

        let (plan, planner_kind) = match planner {
            Some(generator) => match self.plan(generator, request, cancel, request_id).await {
                Ok(plan) => (Some(plan), PlannerKind::Gemini),
                Err(StagingError::Cancelled) => return Err(StagingError::Cancelled),
                Err(error) => {
                    events::fallback_engaged("planner", &error, "fallback plan");
                    low_confidence = true;
                    (
                        Some(fallback_plan(&request.style, request.more_furniture)),
                        PlannerKind::Fallback,
                    )
                },
            },
            None => (None, PlannerKind::None),
        };
        let staging_prompt = match &plan {
            Some(plan) => planned_staging_prompt(&prompts, plan),
            None => unplanned_staging_prompt(&request.style, &prompts, request.more_furniture),
        };

        let convention = self.config.renderer_mask_convention;
        let mut passes = Vec::with_capacity(2);

        let (base, mask, strength, mode_pass) = if self.config.two_pass {
            let coherence = self
                .coherence_pass(renderer, request, &prompts, convention, cancel, request_id)
                .await;
            match coherence {
                Ok((pass1, mask)) => {
                    passes.push(GenerationPass::Coherence);
                    (pass1, mask, self.config.pass2_strength, GenerationPass::Furniture)
                },
                Err(StagingError::Cancelled) => return Err(StagingError::Cancelled),
                Err(error) => {
                    events::fallback_engaged("coherence pass", &error, "original image");
                    low_confidence = true;
                    let mask = self.build_mask(original.clone(), convention).await?;
                    (original.clone(), mask, self.config.pass2_strength, GenerationPass::Furniture)
                },
            }
        } else {
            let mask = self.build_mask(original.clone(), convention).await?;
            (original.clone(), mask, self.config.single_pass_strength, GenerationPass::Single)
        };

        self.save_debug_artifacts(&base, &mask, convention, request_id).await;

        let pass_name = if mode_pass == GenerationPass::Single { "single" } else { "furniture" };
        let output = self
            .render_validated(
                renderer,
                RenderRequest {
                    image: base.clone(),
                    prompt: staging_prompt,
                    strength,
                    mask: Some(mask),
                    mode: RenderMode::Inpaint,
                    request_id: request_id.to_string(),
                },
                cancel,
            )
            .instrument(spans::pass(pass_name, strength))
            .await?;

        // The furniture pass may start from pass-1 output; it must still differ from the upload
        if base != *original {
            let sha = crate::validation::sha256_hex(&output);
            check_unchanged_hash(&sha, &InputFingerprint::new(original))?;
        }
        passes.push(mode_pass);

        Ok(RenderOutcome {
            bytes: output,
            planner: planner_kind,
            passes,
            low_confidence,
        })
    }

    /// Unmasked low-strength pass, returning its output and the mask built from it
    async fn coherence_pass(
        &self,
        renderer: &Arc<dyn ImageRenderer>,
        request: &GenerationRequest,
        prompts: &PromptSet,
        convention: MaskConvention,
        cancel: &CancellationToken,
        request_id: &str,
    ) -> Result<(Vec<u8>, Vec<u8>)> {
        let strength = self.config.pass1_strength;
        let output = self
            .render_validated(
                renderer,
                RenderRequest {
                    image: request.image.bytes.clone(),
                    prompt: coherence_prompt(&request.style, prompts),
                    strength,
                    mask: None,
                    mode: RenderMode::ImageToImage,
                    request_id: request_id.to_string(),
                },
                cancel,
            )
            .instrument(spans::pass("coherence", strength))
            .await?;
        let mask = self.build_mask(output.clone(), convention).await?;
        Ok((output, mask))
    }

    async fn plan(
        &self,
        generator: &Arc<dyn TextGenerator>,
        request: &GenerationRequest,
        cancel: &CancellationToken,
        request_id: &str,
    ) -> Result<StagingPlan> {
        let advisor = PlanningAdvisor::new(Arc::clone(generator));
        let planning = advisor.plan(
            &request.style,
            request.prompt.as_deref(),
            Some(&request.image.bytes),
            request.more_furniture,
            request_id,
        );
        self.guarded(generator.model_name(), cancel, planning)
            .instrument(spans::planning(generator.model_name()))
            .await
    }

    async fn run_editor(
        &self,
        editor: &Arc<dyn ImageEditor>,
        request: &GenerationRequest,
        fallback_used: bool,
        cancel: &CancellationToken,
        request_id: &str,
    ) -> Result<GenerationResult> {
        let input = &request.image.bytes;
        let mask = self.build_mask(input.clone(), MaskConvention::Alpha).await?;
        self.save_debug_artifacts(input, &mask, MaskConvention::Alpha, request_id).await;

        let prompts = PromptSet::resolve(&request.style, request.prompt.as_deref());
        let edit = editor.edit(EditRequest {
            image: input.clone(),
            mask,
            prompt: edit_prompt(&request.style, &prompts, request.more_furniture),
            request_id: request_id.to_string(),
        });
        let output = self
            .guarded(editor.name(), cancel, edit)
            .instrument(spans::pass("edit", 1.0))
            .await?;

        validate_output(
            &output,
            input,
            &InputFingerprint::new(input),
            OutputSource::EditApi,
            request_id,
        )
        .map_err(|e| {
            events::output_rejected(editor.name(), &e);
            e
        })?;

        Ok(GenerationResult {
            provider: ProviderKind::OpenAi,
            planner: PlannerKind::None,
            bytes: output,
            fallback_used,
            passes: vec![GenerationPass::Edit],
            low_confidence: false,
        })
    }

    async fn run_mock(
        &self,
        request: &GenerationRequest,
        cancel: &CancellationToken,
        request_id: &str,
    ) -> Result<GenerationResult> {
        let input = &request.image.bytes;
        let mask = self.build_mask(input.clone(), MaskConvention::Luminance).await?;
        let strength = self.config.single_pass_strength;
        let render = self.providers.mock.render(RenderRequest {
            image: input.clone(),
            prompt: request.style.to_string(),
            strength,
            mask: Some(mask),
            mode: RenderMode::Inpaint,
            request_id: request_id.to_string(),
        });
        let output = self
            .guarded(self.providers.mock.name(), cancel, render)
            .instrument(spans::pass("mock", strength))
            .await?;

        validate_output(
            &output,
            input,
            &InputFingerprint::new(input),
            OutputSource::Mock,
            request_id,
        )?;

        Ok(GenerationResult {
            provider: ProviderKind::Mock,
            planner: PlannerKind::None,
            bytes: output,
            fallback_used: true,
            passes: vec![GenerationPass::Mock],
            low_confidence: true,
        })
    }

    /// Render and check the output against the request's input
    async fn render_validated(
        &self,
        renderer: &Arc<dyn ImageRenderer>,
        request: RenderRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        let input = request.image.clone();
        let request_id = request.request_id.clone();
        let output = self
            .guarded(renderer.name(), cancel, renderer.render(request))
            .instrument(spans::provider_call(renderer.name(), "render"))
            .await?;

        validate_output(
            &output,
            &input,
            &InputFingerprint::new(&input),
            OutputSource::Renderer,
            &request_id,
        )
        .map_err(|e| {
            events::output_rejected(renderer.name(), &e);
            e
        })?;
        Ok(output)
    }

    /// Bound a provider call by the render timeout and the cancellation token
    async fn guarded<T, F>(&self, provider: &str, cancel: &CancellationToken, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let started = instant::Instant::now();
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(StagingError::Cancelled),
            outcome = tokio::time::timeout(self.config.render_timeout, call) => match outcome {
                Ok(result) => result,
                Err(_) => Err(StagingError::provider_timeout(provider, self.config.render_timeout)),
            },
        };
        events::stage_timing(provider, started.elapsed().as_millis() as u64);
        result
    }

    async fn build_mask(&self, image_png: Vec<u8>, convention: MaskConvention) -> Result<Vec<u8>> {
        let masks = self.masks;
        tokio::task::spawn_blocking(move || masks.build_mask(&image_png, convention))
            .await
            .map_err(|e| StagingError::internal(format!("mask task failed: {}", e)))?
    }

    async fn save_debug_artifacts(
        &self,
        image_png: &[u8],
        mask_png: &[u8],
        convention: MaskConvention,
        request_id: &str,
    ) {
        let Some(dir) = self.config.debug_artifact_dir.clone() else {
            return;
        };
        let (image, mask, id) = (image_png.to_vec(), mask_png.to_vec(), request_id.to_string());
        let written = tokio::task::spawn_blocking(move || {
            write_debug_artifacts(&dir, &id, &image, &mask, convention)
        })
        .await;
        match written {
            Ok(Ok(())) => log::debug!("Saved mask debug artifacts for {}", request_id),
            Ok(Err(e)) => log::warn!("Failed to save mask debug artifacts: {}", e),
            Err(e) => log::warn!("Debug artifact task failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::mask::MaskStats;
    use crate::providers::test_utils::{
        noise_png, FakeBehavior, FakeEditor, FakeRenderer, FakeTextGenerator, VALID_PLAN_JSON,
    };
    use crate::style::Style;
    use crate::types::NormalizedImage;

    fn request() -> GenerationRequest {
        GenerationRequest {
            style: Style::parse("modern").unwrap(),
            prompt: None,
            more_furniture: false,
            image: NormalizedImage {
                bytes: noise_png(320, 240, 1000),
                width: 320,
                height: 240,
            },
        }
    }

    fn orchestrator(config: OrchestratorConfig, providers: ProviderSet) -> GenerationOrchestrator {
        GenerationOrchestrator::new(config, providers)
    }

    #[test]
    fn test_selection_truth_table() {
        for bits in 0u8..8 {
            let presence = CredentialPresence {
                renderer: bits & 1 != 0,
                editor: bits & 2 != 0,
                planner: bits & 4 != 0,
            };
            assert_eq!(ProviderState::select(presence, true), ProviderState::Mock);

            let expected = match (presence.renderer, presence.planner, presence.editor) {
                (true, true, _) => ProviderState::ProviderAWithPlanner,
                (true, false, _) => ProviderState::ProviderANoPlanner,
                (false, _, true) => ProviderState::ProviderBFallback,
                (false, _, false) => ProviderState::NoProvider,
            };
            assert_eq!(ProviderState::select(presence, false), expected, "{presence:?}");
        }
    }

    #[tokio::test]
    async fn test_preflight_rejects_missing_providers() {
        let orch = orchestrator(OrchestratorConfig::default(), ProviderSet::empty());
        let err = orch.preflight().unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingProviderKey);

        let err = orch
            .generate(&request(), &CancellationToken::new(), "req")
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingProviderKey);
    }

    #[tokio::test]
    async fn test_two_pass_with_planner() {
        let renderer = FakeRenderer::new(FakeBehavior::Succeed);
        let planner = FakeTextGenerator::answering(VALID_PLAN_JSON);
        let providers = ProviderSet::empty()
            .with_renderer(Arc::new(renderer.clone()))
            .with_planner(Arc::new(planner.clone()));

        let result = orchestrator(OrchestratorConfig::default(), providers)
            .generate(&request(), &CancellationToken::new(), "req")
            .await
            .unwrap();

        assert_eq!(result.provider, ProviderKind::Stability);
        assert_eq!(result.planner, PlannerKind::Gemini);
        assert!(!result.fallback_used);
        assert!(!result.low_confidence);
        assert_eq!(result.passes, vec![GenerationPass::Coherence, GenerationPass::Furniture]);
        assert_eq!(
            renderer.get_call_history(),
            vec!["render:image-to-image:0.35", "render:inpaint:0.75"]
        );
        assert_eq!(planner.get_call_history().len(), 1);

        let requests = renderer.requests();
        assert!(requests[0].mask.is_none());
        assert!(requests[1].mask.is_some());
        assert!(requests[1].prompt.contains("Staging Plan"));
        // Pass 2 starts from pass-1 output
        assert_ne!(requests[1].image, request().image.bytes);
    }

    #[tokio::test]
    async fn test_coherence_failure_uses_original_input() {
        let renderer = FakeRenderer::new(FakeBehavior::FailImageToImage);
        let providers = ProviderSet::empty().with_renderer(Arc::new(renderer.clone()));

        let result = orchestrator(OrchestratorConfig::default(), providers)
            .generate(&request(), &CancellationToken::new(), "req")
            .await
            .unwrap();

        assert_eq!(result.passes, vec![GenerationPass::Furniture]);
        assert!(result.low_confidence);
        assert_eq!(result.planner, PlannerKind::None);
        let requests = renderer.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].image, request().image.bytes);
    }

    #[tokio::test]
    async fn test_planner_failure_uses_fallback_plan() {
        let renderer = FakeRenderer::new(FakeBehavior::Succeed);
        let providers = ProviderSet::empty()
            .with_renderer(Arc::new(renderer.clone()))
            .with_planner(Arc::new(FakeTextGenerator::failing()));
        let config = OrchestratorConfig {
            two_pass: false,
            ..OrchestratorConfig::default()
        };

        let result = orchestrator(config, providers)
            .generate(&request(), &CancellationToken::new(), "req")
            .await
            .unwrap();

        assert_eq!(result.planner, PlannerKind::Fallback);
        assert!(result.low_confidence);
        assert_eq!(result.passes, vec![GenerationPass::Single]);
        assert_eq!(renderer.get_call_history(), vec!["render:inpaint:0.8"]);
        assert!(renderer.requests()[0].prompt.contains("coffee table"));
    }

    #[tokio::test]
    async fn test_renderer_failure_falls_back_to_editor_with_alpha_mask() {
        let editor = FakeEditor::new(FakeBehavior::Succeed);
        let providers = ProviderSet::empty()
            .with_renderer(Arc::new(FakeRenderer::new(FakeBehavior::Fail)))
            .with_editor(Arc::new(editor.clone()));

        let result = orchestrator(OrchestratorConfig::default(), providers)
            .generate(&request(), &CancellationToken::new(), "req")
            .await
            .unwrap();

        assert_eq!(result.provider, ProviderKind::OpenAi);
        assert!(result.fallback_used);
        let sent = editor.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].image, request().image.bytes);
        let mask = image::load_from_memory(&sent[0].mask).unwrap().to_rgba8();
        let stats = MaskStats::compute(&mask, MaskConvention::Alpha);
        assert!(stats.editable > 0);
        assert!(stats.preserved > stats.editable);
        // Rectangle centre sits past the feather reach, ceiling is opaque
        assert_eq!(mask.get_pixel(160, 160).0[3], 0);
        assert_eq!(mask.get_pixel(160, 10).0[3], 255);
    }

    #[tokio::test]
    async fn test_unchanged_output_is_rejected_on_every_path() {
        let renderer = FakeRenderer::new(FakeBehavior::ReturnInput);
        let editor = FakeEditor::new(FakeBehavior::ReturnInput);
        let providers = ProviderSet::empty()
            .with_renderer(Arc::new(renderer.clone()))
            .with_editor(Arc::new(editor.clone()));

        let err = orchestrator(OrchestratorConfig::default(), providers)
            .generate(&request(), &CancellationToken::new(), "req")
            .await
            .unwrap_err();

        assert_eq!(renderer.get_call_history().len(), 2);
        assert_eq!(editor.requests().len(), 1);
        match err {
            StagingError::Generation { cause, .. } => {
                assert_eq!(cause, ErrorCode::ModelReturnedUnchangedImage);
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_mock_fallback_only_when_permitted() {
        let config = OrchestratorConfig {
            mock_fallback_permitted: true,
            ..OrchestratorConfig::default()
        };
        let providers = ProviderSet::empty()
            .with_renderer(Arc::new(FakeRenderer::new(FakeBehavior::Fail)));
        let result = orchestrator(config, providers)
            .generate(&request(), &CancellationToken::new(), "req")
            .await
            .unwrap();
        assert_eq!(result.provider, ProviderKind::Mock);
        assert!(result.fallback_used);
        assert!(result.low_confidence);

        let providers = ProviderSet::empty()
            .with_renderer(Arc::new(FakeRenderer::new(FakeBehavior::Fail)));
        let err = orchestrator(OrchestratorConfig::default(), providers)
            .generate(&request(), &CancellationToken::new(), "req")
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::GenerationFailed);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_force_mock_ignores_credentials() {
        let renderer = FakeRenderer::new(FakeBehavior::Succeed);
        let config = OrchestratorConfig {
            force_mock: true,
            ..OrchestratorConfig::default()
        };
        let providers = ProviderSet::empty().with_renderer(Arc::new(renderer.clone()));
        let result = orchestrator(config, providers)
            .generate(&request(), &CancellationToken::new(), "req")
            .await
            .unwrap();
        assert_eq!(result.provider, ProviderKind::Mock);
        assert!(renderer.get_call_history().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_render_timeout_counts_as_failure() {
        let editor = FakeEditor::new(FakeBehavior::Succeed);
        let config = OrchestratorConfig {
            two_pass: false,
            render_timeout: Duration::from_secs(5),
            ..OrchestratorConfig::default()
        };
        let providers = ProviderSet::empty()
            .with_renderer(Arc::new(FakeRenderer::new(FakeBehavior::Hang)))
            .with_editor(Arc::new(editor.clone()));

        let result = orchestrator(config, providers)
            .generate(&request(), &CancellationToken::new(), "req")
            .await
            .unwrap();
        assert_eq!(result.provider, ProviderKind::OpenAi);
        assert_eq!(editor.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_cancellation_stops_generation() {
        let editor = FakeEditor::new(FakeBehavior::Succeed);
        let providers = ProviderSet::empty()
            .with_renderer(Arc::new(FakeRenderer::new(FakeBehavior::Hang)))
            .with_editor(Arc::new(editor.clone()));
        let orch = orchestrator(OrchestratorConfig::default(), providers);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = orch.generate(&request(), &cancel, "req").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Cancelled);
        assert!(editor.requests().is_empty());
    }
}
