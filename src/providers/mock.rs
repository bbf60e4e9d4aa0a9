//! Deterministic placeholder renderer for development
//!
//! Produces a visibly marked copy of the input so the rest of the pipeline
//! (validation, persistence, history) can be exercised without provider keys.

use super::{ImageRenderer, RenderRequest};
use crate::error::{Result, StagingError};
use crate::mask::encode_rgba_png;
use async_trait::async_trait;
use image::Rgba;

/// Local renderer that tints the editable region of its input
#[derive(Debug, Clone, Copy, Default)]
pub struct MockRenderer;

impl MockRenderer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Warm-tint the masked region (or a border when unmasked)
    ///
    /// # Errors
    /// - [`StagingError::Normalization`] when the input cannot be decoded
    pub fn stage(image_png: &[u8], mask_png: Option<&[u8]>) -> Result<Vec<u8>> {
        let mut image = image::load_from_memory(image_png)
            .map_err(|e| StagingError::normalization_stage_error("mock decode", &e.to_string()))?
            .to_rgba8();
        let mask = mask_png
            .map(image::load_from_memory)
            .transpose()
            .map_err(|e| StagingError::normalization_stage_error("mock mask decode", &e.to_string()))?
            .map(|m| m.to_rgba8());

        let (width, height) = image.dimensions();
        for (x, y, pixel) in image.enumerate_pixels_mut() {
            let weight = match &mask {
                Some(m) if m.width() == width && m.height() == height => {
                    let p = m.get_pixel(x, y).0;
                    // Luminance masks are opaque; alpha masks carry the signal in alpha
                    if p[3] == 255 {
                        f32::from(p[0]) / 255.0
                    } else {
                        f32::from(255 - p[3]) / 255.0
                    }
                },
                _ => {
                    let border = x < 4 || y < 4 || x + 4 >= width || y + 4 >= height;
                    if border {
                        1.0
                    } else {
                        0.0
                    }
                },
            };
            if weight > 0.0 {
                *pixel = tint(*pixel, weight * 0.35);
            }
        }

        // Always differ from the input, even for a fully preserved mask
        if let Some(first) = image.pixels_mut().next() {
            first.0[0] ^= 1;
        }

        encode_rgba_png(&image)
    }
}

fn tint(pixel: Rgba<u8>, amount: f32) -> Rgba<u8> {
    let [r, g, b, a] = pixel.0;
    let mix = |c: u8, target: f32| (f32::from(c) * (1.0 - amount) + target * amount).round() as u8;
    Rgba([mix(r, 214.0), mix(g, 170.0), mix(b, 120.0), a])
}

#[async_trait]
impl ImageRenderer for MockRenderer {
    fn name(&self) -> &str {
        "mock"
    }

    async fn render(&self, request: RenderRequest) -> Result<Vec<u8>> {
        tracing::info!(request_id = %request.request_id, "Rendering mock placeholder");
        tokio::task::spawn_blocking(move || Self::stage(&request.image, request.mask.as_deref()))
            .await
            .map_err(|e| StagingError::internal(format!("mock render task: {}", e)))?
    }
}
