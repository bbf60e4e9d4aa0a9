//! Image normalization
//!
//! Turns an arbitrary uploaded photo into a canonical PNG that every provider
//! accepts: EXIF orientation applied to the pixels, pixel count under the
//! renderer ceiling, even dimensions and (best effort) a byte size under the
//! edit API upload limit.

use crate::error::{Result, StagingError};
use crate::types::NormalizedImage;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// Largest pixel count the renderer accepts
pub const MAX_PIXELS: u64 = 9_437_184;

/// Upload limit of the edit API
pub const MAX_ENCODED_BYTES: usize = 4 * 1024 * 1024;

/// Maximum number of shrink-and-re-encode attempts
pub const MAX_SHRINK_ATTEMPTS: u32 = 3;

/// Dimension multiplier applied on each shrink attempt
pub const SHRINK_FACTOR: f64 = 0.85;

/// Limits applied by [`ImageNormalizer`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizerConfig {
    pub max_pixels: u64,
    pub max_bytes: usize,
    pub max_shrink_attempts: u32,
    pub shrink_factor: f64,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            max_pixels: MAX_PIXELS,
            max_bytes: MAX_ENCODED_BYTES,
            max_shrink_attempts: MAX_SHRINK_ATTEMPTS,
            shrink_factor: SHRINK_FACTOR,
        }
    }
}

/// What the normalizer did to an image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationReport {
    pub source_format: Option<String>,
    pub source_bytes: usize,
    /// Dimensions after orientation, before any resize
    pub oriented_dimensions: (u32, u32),
    /// EXIF orientation value applied (1 when absent)
    pub orientation: u32,
    pub final_dimensions: (u32, u32),
    pub final_bytes: usize,
    /// Encoded size after the initial encode and each shrink attempt
    pub encoded_sizes: Vec<usize>,
    pub shrink_attempts: u32,
    pub within_pixel_limit: bool,
    pub within_byte_limit: bool,
}

/// Stateless image normalizer
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageNormalizer {
    config: NormalizerConfig,
}

impl ImageNormalizer {
    #[must_use]
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    /// Normalize raw image bytes into a canonical PNG
    ///
    /// # Errors
    /// - [`StagingError::Normalization`] when the bytes cannot be decoded,
    ///   the image is smaller than 2x2, the pixel ceiling cannot hold a
    ///   2x2 image, or PNG encoding fails
    pub fn normalize(&self, raw: &[u8]) -> Result<NormalizedImage> {
        self.normalize_with_report(raw).map(|(image, _)| image)
    }

    /// Normalize and also return a report of what changed
    ///
    /// # Errors
    /// Same as [`ImageNormalizer::normalize`].
    pub fn normalize_with_report(&self, raw: &[u8]) -> Result<(NormalizedImage, NormalizationReport)> {
        let source_format = image::guess_format(raw).ok();
        let decoded = image::load_from_memory(raw).map_err(|e| {
            StagingError::normalization_stage_error("decode", &e.to_string())
        })?;

        let orientation = read_exif_orientation(raw);
        let oriented = apply_orientation(decoded, orientation);
        let (width, height) = oriented.dimensions();
        if width < 2 || height < 2 {
            return Err(StagingError::normalization(format!(
                "image too small to stage: {}x{}",
                width, height
            )));
        }

        let (mut target_w, mut target_h) = fit_pixel_ceiling(width, height, self.config.max_pixels);
        if u64::from(target_w) * u64::from(target_h) > self.config.max_pixels {
            return Err(StagingError::normalization(format!(
                "pixel ceiling {} is below the smallest stageable size {}x{}",
                self.config.max_pixels, target_w, target_h
            )));
        }
        log::debug!(
            "Normalizing {}x{} (orientation {}) to target {}x{}",
            width,
            height,
            orientation,
            target_w,
            target_h
        );

        let mut raster = resize_to(&oriented, target_w, target_h);
        let mut bytes = encode_png(&raster, CompressionType::Default)?;
        let mut encoded_sizes = vec![bytes.len()];
        let mut attempts = 0;

        while bytes.len() >= self.config.max_bytes && attempts < self.config.max_shrink_attempts {
            attempts += 1;
            target_w = shrink_even(target_w, self.config.shrink_factor);
            target_h = shrink_even(target_h, self.config.shrink_factor);
            raster = resize_to(&oriented, target_w, target_h);
            bytes = encode_png(&raster, CompressionType::Best)?;
            encoded_sizes.push(bytes.len());
            tracing::debug!(
                attempt = attempts,
                width = target_w,
                height = target_h,
                bytes = bytes.len(),
                "Shrink attempt"
            );
        }

        let (final_w, final_h) = raster.dimensions();
        let report = NormalizationReport {
            source_format: source_format.map(|f| format_name(f).to_string()),
            source_bytes: raw.len(),
            oriented_dimensions: (width, height),
            orientation,
            final_dimensions: (final_w, final_h),
            final_bytes: bytes.len(),
            encoded_sizes,
            shrink_attempts: attempts,
            within_pixel_limit: u64::from(final_w) * u64::from(final_h) <= self.config.max_pixels,
            within_byte_limit: bytes.len() < self.config.max_bytes,
        };

        if !report.within_byte_limit {
            log::warn!(
                "Normalized image still {} bytes after {} shrink attempts (limit {})",
                bytes.len(),
                attempts,
                self.config.max_bytes
            );
        }

        Ok((
            NormalizedImage {
                bytes,
                width: final_w,
                height: final_h,
            },
            report,
        ))
    }
}

/// Compute even target dimensions whose product stays under `max_pixels`
///
/// Images already under the ceiling keep their size, truncated to even.
/// When the 2 pixel floor on the short side pushes a thin image back over
/// the ceiling, the long side absorbs the difference. Only a ceiling below
/// 4 pixels leaves the result over the limit.
#[must_use]
pub fn fit_pixel_ceiling(width: u32, height: u32, max_pixels: u64) -> (u32, u32) {
    let pixels = u64::from(width) * u64::from(height);
    let (w, h) = if pixels > max_pixels {
        let scale = (max_pixels as f64 / pixels as f64).sqrt();
        (
            force_even((f64::from(width) * scale).floor() as u32),
            force_even((f64::from(height) * scale).floor() as u32),
        )
    } else {
        (force_even(width), force_even(height))
    };

    if u64::from(w) * u64::from(h) <= max_pixels {
        return (w, h);
    }
    if w >= h {
        (clamp_long_side(max_pixels, h), h)
    } else {
        (w, clamp_long_side(max_pixels, w))
    }
}

fn clamp_long_side(max_pixels: u64, short: u32) -> u32 {
    let long = (max_pixels / u64::from(short)).min(u64::from(u32::MAX));
    force_even(long as u32)
}

fn shrink_even(dimension: u32, factor: f64) -> u32 {
    force_even((f64::from(dimension) * factor).floor() as u32)
}

fn force_even(dimension: u32) -> u32 {
    (dimension - dimension % 2).max(2)
}

/// Fit `image` into the target box without upscaling
///
/// A parity-only adjustment crops the trailing row or column instead of
/// resampling the whole image.
fn resize_to(image: &DynamicImage, width: u32, height: u32) -> DynamicImage {
    let (src_w, src_h) = image.dimensions();
    if (width, height) == (src_w, src_h) {
        return image.clone();
    }
    if src_w - width <= 1 && src_h - height <= 1 {
        return image.crop_imm(0, 0, width, height);
    }
    image.resize_exact(width, height, FilterType::Lanczos3)
}

fn encode_png(image: &DynamicImage, compression: CompressionType) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let encoder = PngEncoder::new_with_quality(&mut buffer, compression, PngFilter::Adaptive);
    image
        .write_with_encoder(encoder)
        .map_err(|e| StagingError::normalization_stage_error("encode", &e.to_string()))?;
    Ok(buffer)
}

/// Read the EXIF orientation tag, defaulting to 1 (upright)
#[must_use]
pub fn read_exif_orientation(raw: &[u8]) -> u32 {
    let mut cursor = Cursor::new(raw);
    let Ok(exif) = exif::Reader::new().read_from_container(&mut cursor) else {
        return 1;
    };
    exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
        .filter(|value| (1..=8).contains(value))
        .unwrap_or(1)
}

/// Rotate and flip pixels so the image displays upright without EXIF
#[must_use]
pub fn apply_orientation(image: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => image.fliph(),
        3 => image.rotate180(),
        4 => image.flipv(),
        5 => image.rotate90().fliph(),
        6 => image.rotate90(),
        7 => image.rotate270().fliph(),
        8 => image.rotate270(),
        _ => image,
    }
}

fn format_name(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "png",
        ImageFormat::Jpeg => "jpeg",
        ImageFormat::WebP => "webp",
        ImageFormat::Tiff => "tiff",
        ImageFormat::Bmp => "bmp",
        ImageFormat::Gif => "gif",
        _ => "other",
    }
}
