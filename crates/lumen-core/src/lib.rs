//! Lumen Core - image processing pipeline for an AI photo gallery.
//!
//! Takes an uploaded image reference, produces a thumbnail, dominant colors,
//! AI tags and a description, and persists them as one metadata record.
//!
//! # Architecture
//!
//! ```text
//! Queue → Lookup → Download → Thumbnail → Colors → Upload → Vision → Persist
//! ```
//!
//! Storage, the metadata store and the vision model sit behind the
//! [`Storage`], [`MetadataStore`] and [`VisionService`] traits; the Supabase
//! and OpenAI/Anthropic implementations are bound at startup.
//!
//! # Usage
//!
//! ```rust,ignore
//! use lumen_core::{Config, ImagePipeline, ProcessingRequest};
//!
//! #[tokio::main]
//! async fn main() -> lumen_core::Result<()> {
//!     let config = Config::load()?;
//!     let pipeline = ImagePipeline::from_config(&config)?;
//!
//!     let request = ProcessingRequest::new(42, "u1", "u1/original/cat.jpg", "cat.jpg");
//!     let outcome = pipeline.process(&request).await;
//!     println!("{}", outcome.label());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod pipeline;
pub mod storage;
pub mod store;
pub mod supabase;
pub mod types;
pub mod vision;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use error::{ConfigError, LumenError, PipelineError, PipelineResult, Result};
pub use pipeline::{ImagePipeline, PipelineOutcome, ProcessingQueue, QueueError, QueueHandle, Step};
pub use storage::Storage;
pub use store::MetadataStore;
pub use types::{ImageMetadataRecord, ProcessingRequest, ProcessingStatus, Rgb, VisionAnalysis};
pub use vision::VisionService;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
