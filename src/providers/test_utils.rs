//! Fake providers for orchestrator and pipeline tests
//!
//! These implement the provider traits without any network access and record
//! every call so tests can assert on ordering and inputs.

use super::{EditRequest, ImageEditor, ImageRenderer, RenderMode, RenderRequest, TextGenerator};
use crate::error::{Result, StagingError};
use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::sync::{Arc, Mutex};

/// Encoded noise PNG; large enough to pass the renderer size floor at 320x240
pub fn noise_png(width: u32, height: u32, seed: u32) -> Vec<u8> {
    let mut state = seed.wrapping_mul(0x9E37_79B9) | 1;
    let image = RgbImage::from_fn(width, height, |_, _| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let [a, b, c, _] = state.to_le_bytes();
        Rgb([a, b, c])
    });
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

/// Smooth gradient PNG standing in for a room photo
pub fn room_png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

/// How a fake provider responds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeBehavior {
    /// Return a fresh noise image
    Succeed,
    /// Fail every call with a provider error
    Fail,
    /// Fail only unmasked image-to-image calls
    FailImageToImage,
    /// Echo the input bytes back
    ReturnInput,
    /// Never answer
    Hang,
}

/// Fake renderer recording every request
#[derive(Debug, Clone)]
pub struct FakeRenderer {
    behavior: FakeBehavior,
    requests: Arc<Mutex<Vec<RenderRequest>>>,
    call_history: Arc<Mutex<Vec<String>>>,
}

impl FakeRenderer {
    pub fn new(behavior: FakeBehavior) -> Self {
        Self {
            behavior,
            requests: Arc::new(Mutex::new(Vec::new())),
            call_history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn get_call_history(&self) -> Vec<String> {
        self.call_history.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<RenderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageRenderer for FakeRenderer {
    fn name(&self) -> &str {
        "fake-renderer"
    }

    async fn render(&self, request: RenderRequest) -> Result<Vec<u8>> {
        let seq = {
            let mut history = self.call_history.lock().unwrap();
            history.push(format!("render:{}:{}", request.mode.as_str(), request.strength));
            history.len() as u32
        };
        self.requests.lock().unwrap().push(request.clone());

        match self.behavior {
            FakeBehavior::Succeed => Ok(noise_png(320, 240, seq)),
            FakeBehavior::Fail => Err(StagingError::provider_request("fake-renderer", "HTTP 500")),
            FakeBehavior::FailImageToImage if request.mode == RenderMode::ImageToImage => {
                Err(StagingError::provider_request("fake-renderer", "HTTP 502"))
            },
            FakeBehavior::FailImageToImage => Ok(noise_png(320, 240, seq)),
            FakeBehavior::ReturnInput => Ok(request.image),
            FakeBehavior::Hang => std::future::pending().await,
        }
    }
}

/// Fake edit API recording every request
#[derive(Debug, Clone)]
pub struct FakeEditor {
    behavior: FakeBehavior,
    requests: Arc<Mutex<Vec<EditRequest>>>,
}

impl FakeEditor {
    pub fn new(behavior: FakeBehavior) -> Self {
        Self {
            behavior,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn requests(&self) -> Vec<EditRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageEditor for FakeEditor {
    fn name(&self) -> &str {
        "fake-editor"
    }

    async fn edit(&self, request: EditRequest) -> Result<Vec<u8>> {
        self.requests.lock().unwrap().push(request.clone());
        match self.behavior {
            FakeBehavior::Succeed | FakeBehavior::FailImageToImage => Ok(noise_png(320, 240, 99)),
            FakeBehavior::Fail => Err(StagingError::provider_request("fake-editor", "HTTP 400")),
            FakeBehavior::ReturnInput => Ok(request.image),
            FakeBehavior::Hang => std::future::pending().await,
        }
    }
}

/// Fake text model returning a canned answer
#[derive(Debug, Clone)]
pub struct FakeTextGenerator {
    response: std::result::Result<String, String>,
    call_history: Arc<Mutex<Vec<String>>>,
}

impl FakeTextGenerator {
    pub fn answering<S: Into<String>>(text: S) -> Self {
        Self {
            response: Ok(text.into()),
            call_history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing() -> Self {
        Self {
            response: Err("HTTP 503".to_string()),
            call_history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn get_call_history(&self) -> Vec<String> {
        self.call_history.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for FakeTextGenerator {
    fn model_name(&self) -> &str {
        "fake-text"
    }

    async fn complete(&self, prompt: &str, image_png: Option<&[u8]>, _request_id: &str) -> Result<String> {
        self.call_history.lock().unwrap().push(format!(
            "complete:prompt={}:image={}",
            prompt.len(),
            image_png.is_some()
        ));
        self.response
            .clone()
            .map_err(|e| StagingError::provider_request("fake-text", e))
    }
}

/// A plan the fake text model can return
pub const VALID_PLAN_JSON: &str = r#"```json
{
  "roomType": "living room",
  "style": "modern",
  "addItems": [
    {"item": "sofa", "placement": "on floor, center-left", "scale": "large", "material": "fabric", "color": "gray"}
  ],
  "avoid": ["preserve existing architecture"],
  "lighting": "daylight",
  "colorPalette": ["gray", "white"]
}
```"#;
