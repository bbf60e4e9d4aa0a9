//! Core types shared across the staging pipeline

use crate::error::{ErrorCode, StagingError};
use crate::style::Style;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Maximum number of designs retained in a [`DesignHistory`]
pub const MAX_DESIGN_HISTORY: usize = 12;

/// Image generation provider that produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Inpainting renderer (provider A)
    Stability,
    /// Image edit API (provider B)
    OpenAi,
    /// Local deterministic placeholder renderer
    Mock,
}

impl ProviderKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stability => "stability",
            Self::OpenAi => "openai",
            Self::Mock => "mock",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the staging plan for a render came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlannerKind {
    /// No plan was used
    #[default]
    None,
    /// Plan produced by the text model
    Gemini,
    /// Text model failed; deterministic per-style plan substituted
    Fallback,
}

impl PlannerKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gemini => "gemini",
            Self::Fallback => "fallback",
        }
    }
}

impl fmt::Display for PlannerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A provider call that contributed to a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationPass {
    /// Unmasked low-strength lighting and material pass
    Coherence,
    /// Masked furniture pass following a coherence pass
    Furniture,
    /// Single masked staging call
    Single,
    /// Edit API call with an alpha mask
    Edit,
    /// Placeholder output from the mock renderer
    Mock,
}

/// Canonical PNG produced by the normalizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedImage {
    /// PNG-encoded bytes
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl NormalizedImage {
    #[must_use]
    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Everything the orchestrator needs for one generation
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub style: Style,
    /// Optional refinement text from the user
    pub prompt: Option<String>,
    pub more_furniture: bool,
    pub image: NormalizedImage,
}

/// Output of a successful generation
#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub provider: ProviderKind,
    pub planner: PlannerKind,
    /// Encoded image returned by the provider
    pub bytes: Vec<u8>,
    /// Provider B or the mock renderer stood in for a failed provider A
    pub fallback_used: bool,
    /// Passes that produced the output, in order
    pub passes: Vec<GenerationPass>,
    /// A non-fatal stage degraded (coherence pass skipped, fallback plan, mock output)
    pub low_confidence: bool,
}

/// Inbound request for a staged design
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagingInput {
    /// Local path or HTTP(S) URL of the room photo
    pub image_ref: String,
    /// Requested style name
    pub style: String,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub more_furniture: bool,
}

impl StagingInput {
    pub fn new<I: Into<String>, S: Into<String>>(image_ref: I, style: S) -> Self {
        Self {
            image_ref: image_ref.into(),
            style: style.into(),
            prompt: None,
            more_furniture: false,
        }
    }

    #[must_use]
    pub fn with_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    #[must_use]
    pub fn with_more_furniture(mut self, more_furniture: bool) -> Self {
        self.more_furniture = more_furniture;
        self
    }
}

/// Structured result of the inbound trigger
///
/// Pipeline failures are reported here rather than as an `Err`, so callers
/// always get a request id to correlate with logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StagingOutcome {
    pub success: bool,
    pub request_id: String,
    pub image_url: Option<String>,
    pub error_code: Option<ErrorCode>,
    pub error_message: Option<String>,
    pub retryable: bool,
    pub low_confidence: bool,
    pub provider_used: Option<ProviderKind>,
    pub planner_used: PlannerKind,
    pub fallback_used: bool,
    /// Record the caller may push onto its [`DesignHistory`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub design: Option<DesignRecord>,
}

impl StagingOutcome {
    /// Successful outcome carrying the stored design
    #[must_use]
    pub fn succeeded(request_id: String, result: &GenerationResult, design: DesignRecord) -> Self {
        Self {
            success: true,
            request_id,
            image_url: Some(design.image_url.clone()),
            error_code: None,
            error_message: None,
            retryable: false,
            low_confidence: result.low_confidence,
            provider_used: Some(result.provider),
            planner_used: result.planner,
            fallback_used: result.fallback_used,
            design: Some(design),
        }
    }

    /// Failed outcome for the given error
    #[must_use]
    pub fn failed(request_id: String, error: &StagingError) -> Self {
        let code = error.code();
        Self {
            success: false,
            request_id,
            image_url: None,
            error_code: Some(code),
            error_message: Some(error.to_string()),
            retryable: code.is_retryable(),
            low_confidence: false,
            provider_used: None,
            planner_used: PlannerKind::None,
            fallback_used: false,
            design: None,
        }
    }
}

/// A persisted design as kept in the caller's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignRecord {
    pub id: String,
    pub image_url: String,
    pub style: Style,
    pub provider: ProviderKind,
    pub fallback_used: bool,
    pub created_at: DateTime<Utc>,
}

impl DesignRecord {
    #[must_use]
    pub fn new(image_url: String, style: Style, provider: ProviderKind, fallback_used: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            image_url,
            style,
            provider,
            fallback_used,
            created_at: Utc::now(),
        }
    }
}

/// Newest-first list of generated designs, capped at [`MAX_DESIGN_HISTORY`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DesignHistory {
    records: VecDeque<DesignRecord>,
}

impl DesignHistory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend a record, evicting the oldest beyond the cap
    pub fn push(&mut self, record: DesignRecord) {
        self.records.push_front(record);
        self.records.truncate(MAX_DESIGN_HISTORY);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn latest(&self) -> Option<&DesignRecord> {
        self.records.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DesignRecord> {
        self.records.iter()
    }
}
