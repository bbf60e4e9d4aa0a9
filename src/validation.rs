//! Output validation
//!
//! Every generated image is checked before it may leave the orchestrator:
//! a recognised signature, a plausibility size floor, and two no-op checks
//! against the input (a cheap prefix comparison, then a full SHA-256).

use crate::error::{Result, StagingError};
use crate::types::ProviderKind;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Full 8-byte PNG signature
pub const PNG_SIGNATURE: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// JPEG start-of-image marker
pub const JPEG_SIGNATURE: [u8; 3] = [0xFF, 0xD8, 0xFF];

/// Minimum plausible size of an edit API result
pub const MIN_EDIT_OUTPUT_BYTES: usize = 50 * 1024;

/// Minimum plausible size of a renderer result
pub const MIN_RENDER_OUTPUT_BYTES: usize = 200 * 1024;

/// Minimum size accepted for mock placeholder output
pub const MIN_MOCK_OUTPUT_BYTES: usize = 1024;

/// Number of leading bytes compared by the cheap no-op check
pub const PREFIX_COMPARE_BYTES: usize = 100 * 1024;

/// Encoded image format recognised from its signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectedFormat {
    Png,
    Jpeg,
}

impl DetectedFormat {
    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }
}

/// Which producer an output came from; selects the size floor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSource {
    EditApi,
    Renderer,
    Mock,
}

impl OutputSource {
    #[must_use]
    pub fn min_bytes(self) -> usize {
        match self {
            Self::EditApi => MIN_EDIT_OUTPUT_BYTES,
            Self::Renderer => MIN_RENDER_OUTPUT_BYTES,
            Self::Mock => MIN_MOCK_OUTPUT_BYTES,
        }
    }
}

impl From<ProviderKind> for OutputSource {
    fn from(provider: ProviderKind) -> Self {
        match provider {
            ProviderKind::Stability => Self::Renderer,
            ProviderKind::OpenAi => Self::EditApi,
            ProviderKind::Mock => Self::Mock,
        }
    }
}

/// Summary of an accepted output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedOutput {
    pub format: DetectedFormat,
    pub size: usize,
    pub sha256: String,
}

/// Hash of the bytes handed to a provider, computed once per call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFingerprint {
    sha256: String,
}

impl InputFingerprint {
    #[must_use]
    pub fn new(input: &[u8]) -> Self {
        Self {
            sha256: sha256_hex(input),
        }
    }

    #[must_use]
    pub fn sha256(&self) -> &str {
        &self.sha256
    }
}

/// Detect PNG or JPEG from leading bytes
#[must_use]
pub fn detect_format(bytes: &[u8]) -> Option<DetectedFormat> {
    if bytes.starts_with(&PNG_SIGNATURE) {
        Some(DetectedFormat::Png)
    } else if bytes.starts_with(&JPEG_SIGNATURE) {
        Some(DetectedFormat::Jpeg)
    } else {
        None
    }
}

/// Lowercase hex SHA-256 digest
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Check the signature and size floor
///
/// # Errors
/// - [`StagingError::OutputInvalidFormat`] for unknown signatures
/// - [`StagingError::OutputTooSmall`] below `min_bytes`
pub fn check_signature_and_size(output: &[u8], min_bytes: usize) -> Result<DetectedFormat> {
    let format = detect_format(output).ok_or_else(|| {
        let head: Vec<String> = output.iter().take(8).map(|b| format!("{:02x}", b)).collect();
        StagingError::OutputInvalidFormat(format!("leading bytes [{}]", head.join(" ")))
    })?;

    if output.len() < min_bytes {
        return Err(StagingError::OutputTooSmall {
            size: output.len(),
            minimum: min_bytes,
        });
    }
    Ok(format)
}

/// Cheap no-op check: identical leading window of equal length
///
/// # Errors
/// - [`StagingError::UnchangedImage`] when the windows match
pub fn check_unchanged_prefix(output: &[u8], input: &[u8]) -> Result<()> {
    let out_prefix = &output[..output.len().min(PREFIX_COMPARE_BYTES)];
    let in_prefix = &input[..input.len().min(PREFIX_COMPARE_BYTES)];
    if out_prefix.len() == in_prefix.len() && out_prefix == in_prefix {
        return Err(StagingError::UnchangedImage { check: "prefix" });
    }
    Ok(())
}

/// Full no-op check on the SHA-256 digests
///
/// # Errors
/// - [`StagingError::UnchangedImage`] when the digests match
pub fn check_unchanged_hash(output_sha256: &str, input: &InputFingerprint) -> Result<()> {
    if output_sha256 == input.sha256() {
        return Err(StagingError::UnchangedImage { check: "sha256" });
    }
    Ok(())
}

/// Run all four checks on a provider result
///
/// # Errors
/// The first failing check's error, in the order signature, size, prefix, hash.
pub fn validate_output(
    output: &[u8],
    input: &[u8],
    fingerprint: &InputFingerprint,
    source: OutputSource,
    request_id: &str,
) -> Result<ValidatedOutput> {
    let format = check_signature_and_size(output, source.min_bytes())?;
    check_unchanged_prefix(output, input)?;
    let sha256 = sha256_hex(output);
    check_unchanged_hash(&sha256, fingerprint)?;

    tracing::debug!(
        request_id = %request_id,
        format = ?format,
        size = output.len(),
        output_hash = %&sha256[..16],
        input_hash = %&fingerprint.sha256()[..16],
        "Output validated"
    );

    Ok(ValidatedOutput {
        format,
        size: output.len(),
        sha256,
    })
}
