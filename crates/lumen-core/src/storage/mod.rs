//! Object storage for originals and generated thumbnails.

mod memory;
mod supabase;

pub use memory::{MemoryStorage, StoredObject};
pub use supabase::SupabaseStorage;

use async_trait::async_trait;

use crate::error::PipelineResult;

/// Object storage keyed by path.
///
/// Uses `async_trait` so implementations can be shared as `Arc<dyn Storage>`.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Fetch the object at `path`.
    ///
    /// Fails with `NotFound` when the object does not exist and `StorageIo`
    /// for everything else.
    async fn download(&self, path: &str) -> PipelineResult<Vec<u8>>;

    /// Write `bytes` to `path`, replacing any existing object. Returns the
    /// stored path.
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str)
        -> PipelineResult<String>;
}
