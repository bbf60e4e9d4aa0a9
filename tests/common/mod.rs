//! Shared fixtures and fake collaborators for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use roomstage::{
    BlobStore, EditRequest, ImageEditor, ImageRef, ImageRenderer, ImageSource, MemoryBlobStore,
    ProviderSet, RenderMode, RenderRequest, Result, StagingConfig, StagingError, StagingPipeline,
    TextGenerator,
};
use std::io::Cursor;
use std::sync::{Arc, Mutex};

/// Route `log` output to the test harness; `RUST_LOG=roomstage=debug` to see it
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Incompressible PNG; 320x240 clears the renderer size floor
pub fn noise_png(width: u32, height: u32, seed: u32) -> Vec<u8> {
    let mut state = seed.wrapping_mul(0x9E37_79B9) | 1;
    let image = RgbImage::from_fn(width, height, |_, _| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let [a, b, c, _] = state.to_le_bytes();
        Rgb([a, b, c])
    });
    encode(DynamicImage::ImageRgb8(image), ImageFormat::Png)
}

/// JPEG standing in for a camera photo
///
/// Colour steps every 64 pixels, so blocks decode flat and the normalized
/// PNG stays well under the byte limit even at full resolution.
pub fn gradient_jpeg(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([((x / 64) * 4 % 256) as u8, ((y / 64) * 5 % 256) as u8, 160])
    });
    encode(DynamicImage::ImageRgb8(image), ImageFormat::Jpeg)
}

fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), format).unwrap();
    bytes
}

/// Image source serving fixed bytes and recording every load
#[derive(Debug, Clone, Default)]
pub struct CountingSource {
    bytes: Vec<u8>,
    loads: Arc<Mutex<Vec<String>>>,
}

impl CountingSource {
    pub fn serving(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            loads: Arc::default(),
        }
    }

    pub fn load_count(&self) -> usize {
        self.loads.lock().unwrap().len()
    }
}

#[async_trait]
impl ImageSource for CountingSource {
    async fn load(&self, image: &ImageRef, _request_id: &str) -> Result<Vec<u8>> {
        self.loads.lock().unwrap().push(image.to_string());
        if self.bytes.is_empty() {
            return Err(StagingError::image_load(format!("{} not found", image)));
        }
        Ok(self.bytes.clone())
    }
}

/// How a scripted provider answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Succeed,
    Fail,
    FailImageToImage,
    Echo,
}

/// Renderer following a [`Script`], recording `mode:strength` per call
#[derive(Debug, Clone)]
pub struct ScriptedRenderer {
    script: Script,
    requests: Arc<Mutex<Vec<RenderRequest>>>,
    call_history: Arc<Mutex<Vec<String>>>,
}

impl ScriptedRenderer {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            requests: Arc::default(),
            call_history: Arc::default(),
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
impl ImageRenderer for ScriptedRenderer {
    fn name(&self) -> &str {
        "scripted-renderer"
    }

    async fn render(&self, request: RenderRequest) -> Result<Vec<u8>> {
        let seq = {
            let mut history = self.call_history.lock().unwrap();
            history.push(format!("{}:{}", request.mode.as_str(), request.strength));
            history.len() as u32
        };
        self.requests.lock().unwrap().push(request.clone());

        match (self.script, request.mode) {
            (Script::Fail, _) | (Script::FailImageToImage, RenderMode::ImageToImage) => Err(
                StagingError::provider_status("scripted-renderer", "render", 500, "upstream error"),
            ),
            (Script::Echo, _) => Ok(request.image),
            _ => Ok(noise_png(320, 240, 100 + seq)),
        }
    }
}

/// Edit API following a [`Script`]
#[derive(Debug, Clone)]
pub struct ScriptedEditor {
    script: Script,
    requests: Arc<Mutex<Vec<EditRequest>>>,
}

impl ScriptedEditor {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            requests: Arc::default(),
        }
    }

    pub fn requests(&self) -> Vec<EditRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageEditor for ScriptedEditor {
    fn name(&self) -> &str {
        "scripted-editor"
    }

    async fn edit(&self, request: EditRequest) -> Result<Vec<u8>> {
        self.requests.lock().unwrap().push(request.clone());
        match self.script {
            Script::Fail => Err(StagingError::provider_status(
                "scripted-editor",
                "edit",
                400,
                "invalid mask",
            )),
            Script::Echo => Ok(request.image),
            Script::Succeed | Script::FailImageToImage => Ok(noise_png(320, 240, 900)),
        }
    }
}

/// Text model with a fixed answer, or a fixed failure when `None`
#[derive(Debug, Clone)]
pub struct CannedPlanner {
    answer: Option<String>,
    call_history: Arc<Mutex<Vec<String>>>,
}

impl CannedPlanner {
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: Some(answer.to_string()),
            call_history: Arc::default(),
        }
    }

    pub fn failing() -> Self {
        Self {
            answer: None,
            call_history: Arc::default(),
        }
    }

    pub fn get_call_history(&self) -> Vec<String> {
        self.call_history.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for CannedPlanner {
    fn model_name(&self) -> &str {
        "canned-planner"
    }

    async fn complete(&self, _prompt: &str, image_png: Option<&[u8]>, _request_id: &str) -> Result<String> {
        self.call_history
            .lock()
            .unwrap()
            .push(format!("complete:image={}", image_png.is_some()));
        self.answer
            .clone()
            .ok_or_else(|| StagingError::provider_request("canned-planner", "HTTP 503"))
    }
}

/// Blob store that always fails
#[derive(Debug, Clone, Copy)]
pub struct FailingStore;

#[async_trait]
impl BlobStore for FailingStore {
    async fn store(&self, _bytes: &[u8], _path: &str, _content_type: &str) -> Result<String> {
        Err(StagingError::upload("bucket unavailable"))
    }
}

pub const PLAN_JSON: &str = r#"```json
{
  "roomType": "bedroom",
  "style": "scandinavian",
  "addItems": [
    {"item": "bed", "placement": "on floor, against back wall", "scale": "large", "material": "oak", "color": "white"},
    {"item": "rug", "placement": "on floor, under bed", "scale": "large", "material": "wool", "color": "beige"}
  ],
  "avoid": ["preserve existing architecture"],
  "lighting": "soft daylight",
  "colorPalette": ["white", "beige", "oak"]
}
```"#;

/// Pipeline over a memory store at `https://cdn.test`
pub fn pipeline_with(
    config: &StagingConfig,
    source: CountingSource,
    providers: ProviderSet,
) -> (StagingPipeline, MemoryBlobStore) {
    let store = MemoryBlobStore::new("https://cdn.test");
    let pipeline = StagingPipeline::with_components(
        config,
        Arc::new(source),
        providers,
        Arc::new(store.clone()),
    );
    (pipeline, store)
}
