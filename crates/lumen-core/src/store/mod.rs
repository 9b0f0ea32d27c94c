//! Persistence of image metadata records.

mod memory;
mod supabase;

pub use memory::MemoryMetadataStore;
pub use supabase::SupabaseMetadataStore;

use async_trait::async_trait;

use crate::error::PipelineResult;
use crate::types::ImageMetadataRecord;

/// Metadata records keyed by image id.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Fetch the record for `image_id`, if one exists.
    async fn get(&self, image_id: i64) -> PipelineResult<Option<ImageMetadataRecord>>;

    /// Write the whole record. Readers never observe a partial update.
    async fn upsert(&self, record: &ImageMetadataRecord) -> PipelineResult<()>;

    /// Whether `user_id` owns `image_id`.
    async fn verify_ownership(&self, image_id: i64, user_id: &str) -> PipelineResult<bool>;
}
