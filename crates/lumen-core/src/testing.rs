//! Shared fixtures for unit tests: synthetic images, a scripted vision
//! service and a pipeline wired to in-memory collaborators.

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::Config;
use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::ImagePipeline;
use crate::storage::MemoryStorage;
use crate::store::MemoryMetadataStore;
use crate::types::{ImageMetadataRecord, Rgb, VisionAnalysis};
use crate::vision::{parse_analysis, ImageInput, VisionService};

pub(crate) fn solid_image(width: u32, height: u32, color: Rgb) -> DynamicImage {
    let Rgb(r, g, b) = color;
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([r, g, b])))
}

/// Horizontal stripes one pixel high, cycling through `colors` by row.
pub(crate) fn striped_image(width: u32, height: u32, colors: &[Rgb]) -> DynamicImage {
    let img = RgbImage::from_fn(width, height, |_, y| {
        let Rgb(r, g, b) = colors[y as usize % colors.len()];
        image::Rgb([r, g, b])
    });
    DynamicImage::ImageRgb8(img)
}

/// Vertical bands of the given widths and colors, left to right.
pub(crate) fn banded_image(height: u32, bands: &[(u32, Rgb)]) -> DynamicImage {
    let width = bands.iter().map(|(w, _)| w).sum();
    let img = RgbImage::from_fn(width, height, |x, _| {
        let mut edge = 0;
        for &(w, Rgb(r, g, b)) in bands {
            edge += w;
            if x < edge {
                return image::Rgb([r, g, b]);
            }
        }
        image::Rgb([0, 0, 0])
    });
    DynamicImage::ImageRgb8(img)
}

pub(crate) fn encode_png(image: &DynamicImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

pub(crate) fn encode_jpeg(image: &DynamicImage) -> Vec<u8> {
    let mut buf = Vec::new();
    image
        .to_rgb8()
        .write_with_encoder(JpegEncoder::new_with_quality(&mut buf, 95))
        .unwrap();
    buf
}

enum Reply {
    Analysis(VisionAnalysis),
    Text(String),
    Unavailable,
}

/// Vision service with a scripted reply, an optional delay and call
/// bookkeeping.
pub(crate) struct MockVision {
    reply: Reply,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
    last_tag_count: Mutex<Option<usize>>,
}

impl MockVision {
    fn with_reply(reply: Reply) -> Self {
        Self {
            reply,
            delay: Mutex::new(None),
            calls: AtomicUsize::new(0),
            last_tag_count: Mutex::new(None),
        }
    }

    /// Returns the given tags verbatim (normalization is the pipeline's job).
    pub(crate) fn answering(tags: &[&str], description: &str) -> Self {
        Self::with_reply(Reply::Analysis(VisionAnalysis {
            tags: tags.iter().map(|t| t.to_string()).collect(),
            description: description.to_string(),
        }))
    }

    /// Behaves as if the model replied with `text`.
    pub(crate) fn replying(text: &str) -> Self {
        Self::with_reply(Reply::Text(text.to_string()))
    }

    /// Fails every call as an upstream HTTP 503.
    pub(crate) fn failing() -> Self {
        Self::with_reply(Reply::Unavailable)
    }

    pub(crate) fn with_delay(self, delay: Duration) -> Self {
        self.set_delay(Some(delay));
        self
    }

    pub(crate) fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_tag_count(&self) -> Option<usize> {
        *self.last_tag_count.lock().unwrap()
    }
}

#[async_trait]
impl VisionService for MockVision {
    fn name(&self) -> &str {
        "mock"
    }

    async fn analyze(
        &self,
        _image: &ImageInput,
        tag_count: usize,
    ) -> PipelineResult<VisionAnalysis> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_tag_count.lock().unwrap() = Some(tag_count);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match &self.reply {
            Reply::Analysis(analysis) => Ok(analysis.clone()),
            Reply::Text(text) => parse_analysis(text),
            Reply::Unavailable => Err(PipelineError::AiService {
                message: "mock HTTP 503 Service Unavailable".to_string(),
                status_code: Some(503),
            }),
        }
    }
}

/// A pipeline over in-memory storage and store with a mock vision service.
pub(crate) struct Harness {
    pub storage: Arc<MemoryStorage>,
    pub store: Arc<MemoryMetadataStore>,
    pub vision: Arc<MockVision>,
    pub pipeline: Arc<ImagePipeline>,
}

impl Harness {
    pub(crate) fn new(vision: MockVision) -> Self {
        Self::with_config(Config::default(), vision)
    }

    pub(crate) fn with_config(config: Config, vision: MockVision) -> Self {
        let storage = Arc::new(MemoryStorage::new());
        let store = Arc::new(MemoryMetadataStore::new());
        let vision = Arc::new(vision);
        let pipeline = Arc::new(ImagePipeline::new(
            &config,
            storage.clone(),
            store.clone(),
            vision.clone(),
        ));
        Self {
            storage,
            store,
            vision,
            pipeline,
        }
    }

    /// Add a pending record and its original object.
    pub(crate) fn seed(&self, image_id: i64, user_id: &str, path: &str, bytes: Vec<u8>) {
        self.store
            .insert(ImageMetadataRecord::pending(image_id, user_id, path));
        self.storage.insert(path, bytes, "image/jpeg");
    }

    pub(crate) fn shared_pipeline(&self) -> Arc<ImagePipeline> {
        self.pipeline.clone()
    }
}
