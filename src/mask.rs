//! Inpainting mask generation
//!
//! The editable region is a rectangle inset from the image edges: a generous
//! top margin keeps ceilings, upper walls and windows out of reach, small
//! side and bottom margins keep the frame edges intact. The boundary is
//! feathered with a Gaussian blur so providers blend the edit seamlessly.
//!
//! Two encodings exist because providers disagree on what "editable" means:
//!
//! | Convention  | Background          | Editable rectangle    |
//! |-------------|---------------------|-----------------------|
//! | `Alpha`     | opaque black        | fully transparent     |
//! | `Luminance` | opaque black        | opaque white          |

use crate::error::{Result, StagingError};
use image::codecs::png::PngEncoder;
use image::{DynamicImage, GenericImageView, GrayImage, Luma, Rgba, RgbaImage};
use imageproc::filter::gaussian_blur_f32;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default feather radius in pixels
pub const DEFAULT_FEATHER_RADIUS: f32 = 18.0;

/// Lower edge of the coverage band considered healthy
pub const COVERAGE_TARGET_MIN: f64 = 0.25;

/// Upper edge of the coverage band considered healthy
pub const COVERAGE_TARGET_MAX: f64 = 0.40;

/// How a mask encodes the editable region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MaskConvention {
    /// Transparent pixels are editable (edit API convention)
    #[default]
    Alpha,
    /// White pixels are editable (inpaint renderer convention)
    Luminance,
}

/// Fractional margins that stay untouched
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaskMargins {
    pub left: f64,
    pub right: f64,
    pub top: f64,
    pub bottom: f64,
}

impl Default for MaskMargins {
    fn default() -> Self {
        Self {
            left: 0.07,
            right: 0.07,
            top: 0.42,
            bottom: 0.08,
        }
    }
}

/// Pixel rectangle of the editable region
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaskRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Fraction of the image covered by the rectangle
    pub coverage: f64,
}

impl MaskRegion {
    /// Compute the editable rectangle for an image of the given size
    ///
    /// Each margin is `floor(dimension * fraction)`; the rectangle never
    /// extends past the image.
    #[must_use]
    pub fn compute(width: u32, height: u32, margins: &MaskMargins) -> Self {
        let left = (f64::from(width) * margins.left).floor() as u32;
        let right = (f64::from(width) * margins.right).floor() as u32;
        let top = (f64::from(height) * margins.top).floor() as u32;
        let bottom = (f64::from(height) * margins.bottom).floor() as u32;

        let region_w = width.saturating_sub(left).saturating_sub(right);
        let region_h = height.saturating_sub(top).saturating_sub(bottom);
        let total = u64::from(width) * u64::from(height);
        let coverage = if total == 0 {
            0.0
        } else {
            (u64::from(region_w) * u64::from(region_h)) as f64 / total as f64
        };

        Self {
            x: left.min(width),
            y: top.min(height),
            width: region_w,
            height: region_h,
            coverage,
        }
    }

    #[must_use]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && x < self.x + self.width && y >= self.y && y < self.y + self.height
    }

    #[must_use]
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Whether coverage falls inside the 25-40% band
    #[must_use]
    pub fn within_target(&self) -> bool {
        (COVERAGE_TARGET_MIN..=COVERAGE_TARGET_MAX).contains(&self.coverage)
    }
}

/// Pixel classification of a finished mask
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaskStats {
    pub editable: u64,
    pub preserved: u64,
    pub partial: u64,
    pub editable_fraction: f64,
}

impl MaskStats {
    /// Classify every pixel of `mask` under `convention`
    #[must_use]
    pub fn compute(mask: &RgbaImage, convention: MaskConvention) -> Self {
        let mut editable = 0u64;
        let mut preserved = 0u64;
        let mut partial = 0u64;

        for pixel in mask.pixels() {
            let level = match convention {
                // Transparent means editable, so invert alpha
                MaskConvention::Alpha => 255 - pixel.0[3],
                MaskConvention::Luminance => pixel.0[0],
            };
            match level {
                255 => editable += 1,
                0 => preserved += 1,
                _ => partial += 1,
            }
        }

        let total = editable + preserved + partial;
        Self {
            editable,
            preserved,
            partial,
            editable_fraction: if total == 0 {
                0.0
            } else {
                editable as f64 / total as f64
            },
        }
    }
}

/// Builds feathered masks for a given margin set
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaskGenerator {
    margins: MaskMargins,
    feather_radius: f32,
}

impl Default for MaskGenerator {
    fn default() -> Self {
        Self::new(MaskMargins::default(), DEFAULT_FEATHER_RADIUS)
    }
}

impl MaskGenerator {
    #[must_use]
    pub fn new(margins: MaskMargins, feather_radius: f32) -> Self {
        Self {
            margins,
            feather_radius: feather_radius.max(0.0),
        }
    }

    #[must_use]
    pub fn margins(&self) -> &MaskMargins {
        &self.margins
    }

    #[must_use]
    pub fn feather_radius(&self) -> f32 {
        self.feather_radius
    }

    /// Build a mask raster for an image of the given size
    #[must_use]
    pub fn build_raster(&self, width: u32, height: u32, convention: MaskConvention) -> RgbaImage {
        let region = MaskRegion::compute(width, height, &self.margins);
        let hard = GrayImage::from_fn(width, height, |x, y| {
            Luma([if region.contains(x, y) { 255 } else { 0 }])
        });
        let level = self.feather(&hard, &region);

        RgbaImage::from_fn(width, height, |x, y| {
            let value = level.get_pixel(x, y).0[0];
            match convention {
                MaskConvention::Alpha => Rgba([0, 0, 0, 255 - value]),
                MaskConvention::Luminance => Rgba([value, value, value, 255]),
            }
        })
    }

    /// Build an encoded PNG mask matching the dimensions of `image_png`
    ///
    /// # Errors
    /// - [`StagingError::Normalization`] when the source cannot be decoded
    /// - [`StagingError::Internal`] when PNG encoding fails
    pub fn build_mask(&self, image_png: &[u8], convention: MaskConvention) -> Result<Vec<u8>> {
        let source = image::load_from_memory(image_png)
            .map_err(|e| StagingError::normalization_stage_error("mask source decode", &e.to_string()))?;
        let (width, height) = source.dimensions();
        let region = MaskRegion::compute(width, height, &self.margins);

        let raster = self.build_raster(width, height, convention);

        tracing::debug!(
            width,
            height,
            region_x = region.x,
            region_y = region.y,
            region_width = region.width,
            region_height = region.height,
            coverage = region.coverage,
            within_target = region.within_target(),
            convention = ?convention,
            "Built inpainting mask"
        );
        if !region.within_target() {
            log::warn!(
                "Mask coverage {:.1}% outside the {:.0}-{:.0}% target band",
                region.coverage * 100.0,
                COVERAGE_TARGET_MIN * 100.0,
                COVERAGE_TARGET_MAX * 100.0
            );
        }

        encode_rgba_png(&raster)
    }

    /// Blur the boundary band of a hard mask
    ///
    /// Only pixels within reach of the kernel can change, so everything
    /// farther than that from the rectangle edge keeps its exact hard value.
    fn feather(&self, hard: &GrayImage, region: &MaskRegion) -> GrayImage {
        if self.feather_radius <= 0.0 || region.area() == 0 {
            return hard.clone();
        }

        let sigma = self.feather_radius;
        let reach = (3.0 * sigma).ceil() as i64;
        let blurred = gaussian_blur_f32(hard, sigma);

        GrayImage::from_fn(hard.width(), hard.height(), |x, y| {
            if distance_to_edge(region, x, y) <= reach {
                *blurred.get_pixel(x, y)
            } else {
                *hard.get_pixel(x, y)
            }
        })
    }
}

/// Chebyshev-style distance from a pixel to the nearest rectangle edge
fn distance_to_edge(region: &MaskRegion, x: u32, y: u32) -> i64 {
    let (x, y) = (i64::from(x), i64::from(y));
    let left = i64::from(region.x);
    let top = i64::from(region.y);
    let right = left + i64::from(region.width);
    let bottom = top + i64::from(region.height);

    if region.contains(x as u32, y as u32) {
        (x - left).min(right - 1 - x).min(y - top).min(bottom - 1 - y)
    } else {
        let dx = (left - x).max(x - (right - 1)).max(0);
        let dy = (top - y).max(y - (bottom - 1)).max(0);
        dx.max(dy)
    }
}

pub(crate) fn encode_rgba_png(raster: &RgbaImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    DynamicImage::ImageRgba8(raster.clone())
        .write_with_encoder(PngEncoder::new(&mut buffer))
        .map_err(|e| StagingError::internal(format!("mask encode failed: {}", e)))?;
    Ok(buffer)
}

/// Write the mask and a red overlay composite for visual inspection
///
/// # Errors
/// - [`StagingError::Io`] when the directory or files cannot be written
/// - [`StagingError::Normalization`] when either input fails to decode
pub fn write_debug_artifacts(
    dir: &Path,
    request_id: &str,
    image_png: &[u8],
    mask_png: &[u8],
    convention: MaskConvention,
) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| StagingError::file_io_error("create", dir, &e))?;

    let image = image::load_from_memory(image_png)
        .map_err(|e| StagingError::normalization(e.to_string()))?
        .to_rgba8();
    let mask = image::load_from_memory(mask_png)
        .map_err(|e| StagingError::normalization(e.to_string()))?
        .to_rgba8();

    let composite = RgbaImage::from_fn(image.width(), image.height(), |x, y| {
        let base = image.get_pixel(x, y).0;
        let m = mask.get_pixel(x.min(mask.width() - 1), y.min(mask.height() - 1)).0;
        let strength = match convention {
            MaskConvention::Alpha => 255 - m[3],
            MaskConvention::Luminance => m[0],
        };
        let t = f32::from(strength) / 255.0 * 0.5;
        let tint = |c: u8, target: f32| (f32::from(c) * (1.0 - t) + target * t).round() as u8;
        Rgba([tint(base[0], 255.0), tint(base[1], 0.0), tint(base[2], 0.0), 255])
    });

    let mask_path = dir.join(format!("{}-mask.png", request_id));
    let composite_path = dir.join(format!("{}-composite.png", request_id));
    std::fs::write(&mask_path, mask_png)
        .map_err(|e| StagingError::file_io_error("write", &mask_path, &e))?;
    std::fs::write(&composite_path, encode_rgba_png(&composite)?)
        .map_err(|e| StagingError::file_io_error("write", &composite_path, &e))?;

    log::info!(
        "Saved mask debug artifacts to {} and {}",
        mask_path.display(),
        composite_path.display()
    );
    Ok(())
}
