//! Image processing pipeline components.
//!
//! - **decode**: Decode images from memory with format sniffing and limits
//! - **thumbnail**: Generate JPEG thumbnails
//! - **colors**: Extract dominant colors
//! - **paths**: Derive thumbnail storage keys
//! - **processor**: Orchestrates a full processing run
//! - **queue**: Bounded background dispatch with a worker limit

pub mod colors;
pub mod decode;
pub mod paths;
pub mod processor;
pub mod queue;
pub mod thumbnail;

// Re-exports for convenient access
pub use colors::DominantColorExtractor;
pub use decode::{detect_media_type, DecodedImage, ImageDecoder};
pub use paths::thumbnail_path;
pub use processor::{ImagePipeline, PipelineOutcome, Step};
pub use queue::{ProcessingQueue, QueueError, QueueHandle, QueueStats};
pub use thumbnail::{Thumbnail, ThumbnailGenerator, THUMBNAIL_CONTENT_TYPE};
