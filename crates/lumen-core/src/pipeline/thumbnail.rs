//! Thumbnail generation with JPEG output.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};

use crate::config::{ResizePolicy, ThumbnailConfig};
use crate::error::PipelineError;

/// Content type of every generated thumbnail.
pub const THUMBNAIL_CONTENT_TYPE: &str = "image/jpeg";

/// An encoded thumbnail.
#[derive(Debug, Clone)]
pub struct Thumbnail {
    /// JPEG bytes
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Generates JPEG thumbnails from decoded images.
#[derive(Debug, Clone)]
pub struct ThumbnailGenerator {
    config: ThumbnailConfig,
}

impl ThumbnailGenerator {
    /// Create a new thumbnail generator with the given configuration.
    pub fn new(config: ThumbnailConfig) -> Self {
        Self { config }
    }

    /// Resize `image` into the configured box and encode it as JPEG.
    ///
    /// With [`ResizePolicy::Fit`] images already inside the box are not
    /// upscaled. With [`ResizePolicy::Crop`] the output is always exactly
    /// size x size.
    pub fn generate(&self, image: &DynamicImage, path: &str) -> Result<Thumbnail, PipelineError> {
        let size = self.config.size;
        let (width, height) = image.dimensions();

        let resized = match self.config.policy {
            ResizePolicy::Fit if width <= size && height <= size => image.clone(),
            ResizePolicy::Fit => image.resize(size, size, FilterType::Lanczos3),
            ResizePolicy::Crop => image.resize_to_fill(size, size, FilterType::Lanczos3),
        };

        // JPEG has no alpha channel.
        let rgb = DynamicImage::ImageRgb8(resized.to_rgb8());
        let (width, height) = rgb.dimensions();

        let mut bytes = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut bytes, self.config.quality);
        rgb.write_with_encoder(encoder)
            .map_err(|e| PipelineError::Encode {
                path: path.to_string(),
                message: e.to_string(),
            })?;

        Ok(Thumbnail {
            bytes,
            width,
            height,
        })
    }

    /// The bounding box edge in pixels.
    pub fn size(&self) -> u32 {
        self.config.size
    }
}
