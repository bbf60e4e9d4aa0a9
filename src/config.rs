//! Configuration types for the staging pipeline
//!
//! A [`StagingConfig`] is built once per process, either through
//! [`StagingConfig::builder`] or from the environment, and passed explicitly
//! to everything that needs it.

use crate::error::{ErrorCode, Result, StagingError};
use crate::mask::{MaskConvention, MaskMargins, DEFAULT_FEATHER_RADIUS};
use crate::normalize::NormalizerConfig;
use crate::providers::gemini::DEFAULT_TEXT_MODEL;
use crate::providers::CredentialPresence;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Strength of the unmasked coherence pass
pub const PASS1_STRENGTH: f32 = 0.35;

/// Strength of the masked furniture pass
pub const PASS2_STRENGTH: f32 = 0.75;

/// Strength of the single masked pass
pub const SINGLE_PASS_STRENGTH: f32 = 0.8;

/// Renderer guidance scale
pub const DEFAULT_GUIDANCE_SCALE: f32 = 7.5;

/// Upper bound on one render call
pub const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 60;

/// Deployment environment; gates mock fallback and debug artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Test,
    #[default]
    Production,
}

impl Environment {
    /// Parse an environment name; anything unrecognised is production
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Self::Development,
            "test" => Self::Test,
            _ => Self::Production,
        }
    }
}

/// Provider API keys
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub stability_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
}

impl Credentials {
    #[must_use]
    pub fn presence(&self) -> CredentialPresence {
        CredentialPresence {
            renderer: self.stability_api_key.is_some(),
            editor: self.openai_api_key.is_some(),
            planner: self.gemini_api_key.is_some(),
        }
    }

    /// Renderer key, or `MISSING_STABILITY_KEY`
    ///
    /// # Errors
    /// [`StagingError::MissingCredential`] when the key is absent.
    pub fn stability_key(&self) -> Result<&str> {
        require(&self.stability_api_key, ErrorCode::MissingStabilityKey, "STABILITY_API_KEY")
    }

    /// Edit API key, or `MISSING_OPENAI_KEY`
    ///
    /// # Errors
    /// [`StagingError::MissingCredential`] when the key is absent.
    pub fn openai_key(&self) -> Result<&str> {
        require(&self.openai_api_key, ErrorCode::MissingOpenaiKey, "OPENAI_API_KEY")
    }

    /// Planner key, or `MISSING_GEMINI_KEY`
    ///
    /// # Errors
    /// [`StagingError::MissingCredential`] when the key is absent.
    pub fn gemini_key(&self) -> Result<&str> {
        require(&self.gemini_api_key, ErrorCode::MissingGeminiKey, "GEMINI_API_KEY")
    }
}

fn require<'a>(key: &'a Option<String>, code: ErrorCode, variable: &'static str) -> Result<&'a str> {
    key.as_deref()
        .ok_or_else(|| StagingError::missing_credential(code, variable))
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |key: &Option<String>| key.as_ref().map(|_| "<redacted>");
        f.debug_struct("Credentials")
            .field("stability_api_key", &redact(&self.stability_api_key))
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("gemini_api_key", &redact(&self.gemini_api_key))
            .finish()
    }
}

/// Configuration for the staging pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    /// Never serialized
    #[serde(skip)]
    pub credentials: Credentials,

    pub environment: Environment,

    /// Always use the mock renderer
    pub force_mock: bool,

    /// Permit the mock renderer when no provider is configured (development only)
    pub allow_mock_fallback: bool,

    /// Run the coherence pass before the furniture pass
    pub two_pass: bool,

    pub pass1_strength: f32,
    pub pass2_strength: f32,
    pub single_pass_strength: f32,

    /// Omitted from renderer requests when zero
    pub guidance_scale: f32,

    /// Mask encoding sent to the renderer
    pub renderer_mask_convention: MaskConvention,

    pub gemini_text_model: String,

    pub render_timeout_secs: u64,

    /// Root directory for persisted designs
    pub storage_dir: PathBuf,

    /// URL prefix under which `storage_dir` is served
    pub public_base_url: String,

    /// Directory that site-relative image references resolve against
    pub public_asset_root: Option<PathBuf>,

    pub save_debug_artifacts: bool,
    pub debug_artifact_dir: PathBuf,

    pub normalizer: NormalizerConfig,
    pub mask_margins: MaskMargins,
    pub feather_radius: f32,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            environment: Environment::Production,
            force_mock: false,
            allow_mock_fallback: false,
            two_pass: true,
            pass1_strength: PASS1_STRENGTH,
            pass2_strength: PASS2_STRENGTH,
            single_pass_strength: SINGLE_PASS_STRENGTH,
            guidance_scale: DEFAULT_GUIDANCE_SCALE,
            renderer_mask_convention: MaskConvention::Luminance,
            gemini_text_model: DEFAULT_TEXT_MODEL.to_string(),
            render_timeout_secs: DEFAULT_RENDER_TIMEOUT_SECS,
            storage_dir: PathBuf::from("public"),
            public_base_url: String::new(),
            public_asset_root: None,
            save_debug_artifacts: false,
            debug_artifact_dir: std::env::temp_dir().join("roomstage-debug"),
            normalizer: NormalizerConfig::default(),
            mask_margins: MaskMargins::default(),
            feather_radius: DEFAULT_FEATHER_RADIUS,
        }
    }
}

impl StagingConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> StagingConfigBuilder {
        StagingConfigBuilder::default()
    }

    /// Load configuration from the process environment
    ///
    /// # Errors
    /// - [`StagingError::InvalidConfig`] for unparseable or out-of-range values
    pub fn from_env() -> Result<Self> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_env_map(&vars)
    }

    /// Load configuration from an explicit variable map
    ///
    /// # Errors
    /// - [`StagingError::InvalidConfig`] for unparseable or out-of-range values
    pub fn from_env_map(vars: &HashMap<String, String>) -> Result<Self> {
        let get = |name: &str| {
            vars.get(name)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let flag = |name: &str| get(name).is_some_and(|v| is_truthy(&v));

        let mut config = Self {
            credentials: Credentials {
                stability_api_key: get("STABILITY_API_KEY"),
                openai_api_key: get("OPENAI_API_KEY"),
                gemini_api_key: get("GEMINI_API_KEY"),
            },
            environment: get("APP_ENV")
                .or_else(|| get("NODE_ENV"))
                .map(|v| Environment::parse(&v))
                .unwrap_or_default(),
            force_mock: flag("FORCE_MOCK_AI"),
            allow_mock_fallback: flag("ALLOW_MOCK_FALLBACK"),
            save_debug_artifacts: flag("SAVE_DEBUG_ARTIFACTS"),
            ..Self::default()
        };

        if let Some(value) = get("STABILITY_STRENGTH") {
            config.single_pass_strength = parse_number("STABILITY_STRENGTH", &value)?;
        }
        if let Some(value) = get("STABILITY_GUIDANCE_SCALE") {
            config.guidance_scale = parse_number("STABILITY_GUIDANCE_SCALE", &value)?;
        }
        if let Some(value) = get("STABILITY_MASK_INVERT") {
            config.renderer_mask_convention = if value.eq_ignore_ascii_case("false") {
                MaskConvention::Alpha
            } else {
                MaskConvention::Luminance
            };
        }
        if let Some(value) = get("GEMINI_TEXT_MODEL") {
            config.gemini_text_model = value;
        }
        if let Some(value) = get("ROOMSTAGE_TWO_PASS") {
            config.two_pass = is_truthy(&value);
        }
        if let Some(value) = get("ROOMSTAGE_RENDER_TIMEOUT_SECS") {
            config.render_timeout_secs = parse_number("ROOMSTAGE_RENDER_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = get("ROOMSTAGE_STORAGE_DIR") {
            config.storage_dir = PathBuf::from(value);
        }
        if let Some(value) = get("ROOMSTAGE_PUBLIC_URL") {
            config.public_base_url = value;
        }
        if let Some(value) = get("ROOMSTAGE_PUBLIC_ROOT") {
            config.public_asset_root = Some(PathBuf::from(value));
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate ranges
    ///
    /// # Errors
    /// - [`StagingError::InvalidConfig`] naming the offending parameter
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("pass1_strength", self.pass1_strength),
            ("pass2_strength", self.pass2_strength),
            ("single_pass_strength", self.single_pass_strength),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(StagingError::config_value_error(name, value, "(0.0, 1.0]"));
            }
        }
        if !(self.guidance_scale >= 0.0 && self.guidance_scale.is_finite()) {
            return Err(StagingError::config_value_error(
                "guidance_scale",
                self.guidance_scale,
                ">= 0.0",
            ));
        }
        if self.render_timeout_secs == 0 {
            return Err(StagingError::config_value_error("render_timeout_secs", 0, ">= 1"));
        }
        if self.feather_radius < 0.0 {
            return Err(StagingError::config_value_error(
                "feather_radius",
                self.feather_radius,
                ">= 0.0",
            ));
        }
        let m = &self.mask_margins;
        if m.left + m.right >= 1.0 || m.top + m.bottom >= 1.0 || [m.left, m.right, m.top, m.bottom].iter().any(|v| *v < 0.0) {
            return Err(StagingError::invalid_config(
                "mask margins must be non-negative and leave a non-empty region",
            ));
        }
        if self.normalizer.max_pixels == 0 || self.normalizer.max_bytes == 0 {
            return Err(StagingError::invalid_config("normalizer limits must be positive"));
        }
        if !(self.normalizer.shrink_factor > 0.0 && self.normalizer.shrink_factor < 1.0) {
            return Err(StagingError::config_value_error(
                "shrink_factor",
                self.normalizer.shrink_factor,
                "(0.0, 1.0)",
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    /// HTTP client timeout; a little above the render deadline so the
    /// orchestrator's own deadline fires first
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs + 15)
    }

    /// Mock fallback needs both the flag and a development environment
    #[must_use]
    pub fn mock_fallback_permitted(&self) -> bool {
        self.allow_mock_fallback && self.environment == Environment::Development
    }

    #[must_use]
    pub fn debug_artifacts_enabled(&self) -> bool {
        self.save_debug_artifacts && self.environment == Environment::Development
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "yes" | "on"
    )
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| StagingError::invalid_config(format!("{} is not a valid number: '{}'", name, value)))
}

/// Builder for [`StagingConfig`]
#[derive(Debug, Default)]
pub struct StagingConfigBuilder {
    config: StagingConfig,
}

impl StagingConfigBuilder {
    #[must_use]
    pub fn stability_api_key<S: Into<String>>(mut self, key: S) -> Self {
        self.config.credentials.stability_api_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn openai_api_key<S: Into<String>>(mut self, key: S) -> Self {
        self.config.credentials.openai_api_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn gemini_api_key<S: Into<String>>(mut self, key: S) -> Self {
        self.config.credentials.gemini_api_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.config.credentials = credentials;
        self
    }

    #[must_use]
    pub fn environment(mut self, environment: Environment) -> Self {
        self.config.environment = environment;
        self
    }

    #[must_use]
    pub fn force_mock(mut self, force: bool) -> Self {
        self.config.force_mock = force;
        self
    }

    #[must_use]
    pub fn allow_mock_fallback(mut self, allow: bool) -> Self {
        self.config.allow_mock_fallback = allow;
        self
    }

    #[must_use]
    pub fn two_pass(mut self, enabled: bool) -> Self {
        self.config.two_pass = enabled;
        self
    }

    #[must_use]
    pub fn single_pass_strength(mut self, strength: f32) -> Self {
        self.config.single_pass_strength = strength;
        self
    }

    #[must_use]
    pub fn pass_strengths(mut self, pass1: f32, pass2: f32) -> Self {
        self.config.pass1_strength = pass1;
        self.config.pass2_strength = pass2;
        self
    }

    #[must_use]
    pub fn guidance_scale(mut self, scale: f32) -> Self {
        self.config.guidance_scale = scale;
        self
    }

    #[must_use]
    pub fn renderer_mask_convention(mut self, convention: MaskConvention) -> Self {
        self.config.renderer_mask_convention = convention;
        self
    }

    #[must_use]
    pub fn gemini_text_model<S: Into<String>>(mut self, model: S) -> Self {
        self.config.gemini_text_model = model.into();
        self
    }

    #[must_use]
    pub fn render_timeout(mut self, timeout: Duration) -> Self {
        self.config.render_timeout_secs = timeout.as_secs();
        self
    }

    #[must_use]
    pub fn storage_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.storage_dir = dir.into();
        self
    }

    #[must_use]
    pub fn public_base_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.public_base_url = url.into();
        self
    }

    #[must_use]
    pub fn public_asset_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.config.public_asset_root = Some(root.into());
        self
    }

    #[must_use]
    pub fn save_debug_artifacts<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.save_debug_artifacts = true;
        self.config.debug_artifact_dir = dir.into();
        self
    }

    #[must_use]
    pub fn normalizer(mut self, normalizer: NormalizerConfig) -> Self {
        self.config.normalizer = normalizer;
        self
    }

    #[must_use]
    pub fn mask_margins(mut self, margins: MaskMargins) -> Self {
        self.config.mask_margins = margins;
        self
    }

    #[must_use]
    pub fn feather_radius(mut self, radius: f32) -> Self {
        self.config.feather_radius = radius;
        self
    }

    /// Build the configuration, validating ranges
    ///
    /// # Errors
    /// - [`StagingError::InvalidConfig`] when validation fails
    pub fn build(self) -> Result<StagingConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
