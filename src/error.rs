//! Error types for room-staging operations

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias for staging operations
pub type Result<T> = std::result::Result<T, StagingError>;

/// Stable, caller-facing error codes
///
/// These travel inside [`crate::types::StagingOutcome`] and are part of the
/// public contract; the serialized form is `SCREAMING_SNAKE_CASE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    MissingImage,
    MissingStyle,
    ImageLoadFailed,
    ImageNormalizationFailed,
    MissingStabilityKey,
    MissingOpenaiKey,
    MissingGeminiKey,
    MissingProviderKey,
    GenerationFailed,
    OutputInvalidFormat,
    OutputTooSmall,
    ModelReturnedUnchangedImage,
    UploadImageFailed,
    PlannerFailed,
    ProviderRequestFailed,
    Cancelled,
    InvalidConfig,
    InternalError,
}

impl ErrorCode {
    /// Wire representation of the code
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingImage => "MISSING_IMAGE",
            Self::MissingStyle => "MISSING_STYLE",
            Self::ImageLoadFailed => "IMAGE_LOAD_FAILED",
            Self::ImageNormalizationFailed => "IMAGE_NORMALIZATION_FAILED",
            Self::MissingStabilityKey => "MISSING_STABILITY_KEY",
            Self::MissingOpenaiKey => "MISSING_OPENAI_KEY",
            Self::MissingGeminiKey => "MISSING_GEMINI_KEY",
            Self::MissingProviderKey => "MISSING_PROVIDER_KEY",
            Self::GenerationFailed => "GENERATION_FAILED",
            Self::OutputInvalidFormat => "OUTPUT_INVALID_FORMAT",
            Self::OutputTooSmall => "OUTPUT_TOO_SMALL",
            Self::ModelReturnedUnchangedImage => "MODEL_RETURNED_UNCHANGED_IMAGE",
            Self::UploadImageFailed => "UPLOAD_IMAGE_FAILED",
            Self::PlannerFailed => "PLANNER_FAILED",
            Self::ProviderRequestFailed => "PROVIDER_REQUEST_FAILED",
            Self::Cancelled => "CANCELLED",
            Self::InvalidConfig => "INVALID_CONFIG",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Whether a caller may reasonably retry the whole request
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::GenerationFailed | Self::ProviderRequestFailed | Self::InternalError
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for every stage of the staging pipeline
#[derive(Error, Debug)]
pub enum StagingError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// No usable image reference was supplied
    #[error("Missing image: {0}")]
    MissingImage(String),

    /// No style was supplied
    #[error("Missing style: a design style is required")]
    MissingStyle,

    /// The source image could not be fetched or read
    #[error("Failed to load image: {0}")]
    ImageLoad(String),

    /// The source image could not be decoded or re-encoded
    #[error("Image normalization failed: {0}")]
    Normalization(String),

    /// A required credential is absent
    #[error("Missing credential: {variable} is not configured")]
    MissingCredential {
        code: ErrorCode,
        variable: &'static str,
    },

    /// Every generation path was exhausted
    #[error("Generation failed: {message}")]
    Generation {
        message: String,
        cause: ErrorCode,
    },

    /// Output bytes do not carry a known image signature
    #[error("Output is not a PNG or JPEG image: {0}")]
    OutputInvalidFormat(String),

    /// Output bytes are below the plausibility floor
    #[error("Output too small: {size} bytes (minimum {minimum})")]
    OutputTooSmall { size: usize, minimum: usize },

    /// The provider handed back the input unchanged
    #[error("Model returned the unchanged input image ({check} check)")]
    UnchangedImage { check: &'static str },

    /// Blob storage rejected the result
    #[error("Failed to upload image: {0}")]
    Upload(String),

    /// The planning text model failed or produced an unusable plan
    #[error("Planner failed: {0}")]
    Planner(String),

    /// An HTTP call to a provider failed
    #[error("{provider} request failed: {message}")]
    ProviderRequest { provider: String, message: String },

    /// The caller cancelled the request
    #[error("Request cancelled")]
    Cancelled,

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StagingError {
    /// Stable code for this error
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Io(_) | Self::Internal(_) => ErrorCode::InternalError,
            Self::Image(_) | Self::Normalization(_) => ErrorCode::ImageNormalizationFailed,
            Self::MissingImage(_) => ErrorCode::MissingImage,
            Self::MissingStyle => ErrorCode::MissingStyle,
            Self::ImageLoad(_) => ErrorCode::ImageLoadFailed,
            Self::MissingCredential { code, .. } => *code,
            Self::Generation { .. } => ErrorCode::GenerationFailed,
            Self::OutputInvalidFormat(_) => ErrorCode::OutputInvalidFormat,
            Self::OutputTooSmall { .. } => ErrorCode::OutputTooSmall,
            Self::UnchangedImage { .. } => ErrorCode::ModelReturnedUnchangedImage,
            Self::Upload(_) => ErrorCode::UploadImageFailed,
            Self::Planner(_) => ErrorCode::PlannerFailed,
            Self::ProviderRequest { .. } => ErrorCode::ProviderRequestFailed,
            Self::Cancelled => ErrorCode::Cancelled,
            Self::InvalidConfig(_) => ErrorCode::InvalidConfig,
        }
    }

    /// Whether the request as a whole may be retried by the caller
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }

    /// Whether an idempotent read hitting this error is worth repeating
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ProviderRequest { .. } | Self::Io(_))
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new missing image error
    pub fn missing_image<S: Into<String>>(msg: S) -> Self {
        Self::MissingImage(msg.into())
    }

    /// Create a new image load error
    pub fn image_load<S: Into<String>>(msg: S) -> Self {
        Self::ImageLoad(msg.into())
    }

    /// Create a new normalization error
    pub fn normalization<S: Into<String>>(msg: S) -> Self {
        Self::Normalization(msg.into())
    }

    /// Create a new upload error
    pub fn upload<S: Into<String>>(msg: S) -> Self {
        Self::Upload(msg.into())
    }

    /// Create a new planner error
    pub fn planner<S: Into<String>>(msg: S) -> Self {
        Self::Planner(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create a missing-credential error naming the environment variable
    #[must_use]
    pub fn missing_credential(code: ErrorCode, variable: &'static str) -> Self {
        Self::MissingCredential { code, variable }
    }

    /// No provider credentials at all and mock fallback not permitted
    #[must_use]
    pub fn missing_provider_key() -> Self {
        Self::missing_credential(
            ErrorCode::MissingProviderKey,
            "STABILITY_API_KEY or OPENAI_API_KEY",
        )
    }

    /// Wrap the last failure once every generation path is exhausted
    #[must_use]
    pub fn generation_exhausted(last: &StagingError) -> Self {
        Self::Generation {
            message: last.to_string(),
            cause: last.code(),
        }
    }

    /// Create a provider request error
    pub fn provider_request<P: Into<String>, S: Into<String>>(provider: P, msg: S) -> Self {
        Self::ProviderRequest {
            provider: provider.into(),
            message: msg.into(),
        }
    }

    // Enhanced contextual error creators

    /// Create a provider error from a non-success HTTP status
    pub fn provider_status(provider: &str, operation: &str, status: u16, body: &str) -> Self {
        let detail = if body.is_empty() {
            String::new()
        } else {
            format!(": {}", truncate_for_log(body, 300))
        };

        Self::provider_request(
            provider,
            format!("{} returned HTTP {}{}", operation, status, detail),
        )
    }

    /// Create a provider error from a transport failure
    pub fn network_error(provider: &str, operation: &str, error: &dyn fmt::Display) -> Self {
        Self::provider_request(provider, format!("{} failed: {}", operation, error))
    }

    /// Create a provider timeout error
    #[must_use]
    pub fn provider_timeout(provider: &str, timeout: std::time::Duration) -> Self {
        Self::provider_request(
            provider,
            format!("no response within {}s", timeout.as_secs()),
        )
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
    ) -> Self {
        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {})",
            parameter, value, valid_range
        ))
    }

    /// Create normalization error with stage context
    pub fn normalization_stage_error(stage: &str, details: &str) -> Self {
        Self::Normalization(format!("failed at stage '{}': {}", stage, details))
    }
}

fn truncate_for_log(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            StagingError::missing_provider_key().code(),
            ErrorCode::MissingProviderKey
        );
        assert_eq!(StagingError::Cancelled.code(), ErrorCode::Cancelled);
        assert_eq!(
            StagingError::UnchangedImage { check: "sha256" }.code(),
            ErrorCode::ModelReturnedUnchangedImage
        );
        assert_eq!(
            StagingError::normalization("bad").code(),
            ErrorCode::ImageNormalizationFailed
        );
    }

    #[test]
    fn test_retryable_flags() {
        assert!(ErrorCode::GenerationFailed.is_retryable());
        assert!(ErrorCode::ProviderRequestFailed.is_retryable());
        assert!(ErrorCode::InternalError.is_retryable());
        assert!(!ErrorCode::MissingImage.is_retryable());
        assert!(!ErrorCode::MissingProviderKey.is_retryable());
        assert!(!ErrorCode::OutputTooSmall.is_retryable());
        assert!(!ErrorCode::Cancelled.is_retryable());
    }

    #[test]
    fn test_code_serialization() {
        let json = serde_json::to_string(&ErrorCode::MissingOpenaiKey).unwrap();
        assert_eq!(json, "\"MISSING_OPENAI_KEY\"");
        let json = serde_json::to_string(&ErrorCode::ModelReturnedUnchangedImage).unwrap();
        assert_eq!(json, format!("\"{}\"", ErrorCode::ModelReturnedUnchangedImage));
    }

    #[test]
    fn test_generation_exhausted_keeps_cause() {
        let last = StagingError::OutputTooSmall {
            size: 10,
            minimum: 51_200,
        };
        let err = StagingError::generation_exhausted(&last);
        assert_eq!(err.code(), ErrorCode::GenerationFailed);
        match err {
            StagingError::Generation { message, cause } => {
                assert_eq!(cause, ErrorCode::OutputTooSmall);
                assert!(message.contains("51200"));
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_provider_status_truncates_body() {
        let body = "x".repeat(1000);
        let err = StagingError::provider_status("stability", "inpaint", 500, &body);
        let text = err.to_string();
        assert!(text.contains("HTTP 500"));
        assert!(text.len() < 500);
        assert!(err.is_transient());
    }
}
