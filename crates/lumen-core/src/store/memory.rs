//! In-process metadata store for tests and local runs.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::MetadataStore;
use crate::error::PipelineResult;
use crate::types::{ImageMetadataRecord, ProcessingStatus};

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<i64, ImageMetadataRecord>,
    owners: HashMap<i64, String>,
    writes: Vec<ImageMetadataRecord>,
}

/// Metadata store backed by a map. Every upsert is also appended to a
/// write log so status transitions can be inspected.
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    inner: Mutex<Inner>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record (and its ownership) without logging a write.
    pub fn insert(&self, record: ImageMetadataRecord) {
        let mut inner = self.lock();
        inner.owners.insert(record.image_id, record.user_id.clone());
        inner.records.insert(record.image_id, record);
    }

    /// Register ownership of an image that has no metadata record yet.
    pub fn set_owner(&self, image_id: i64, user_id: &str) {
        self.lock().owners.insert(image_id, user_id.to_string());
    }

    pub fn record(&self, image_id: i64) -> Option<ImageMetadataRecord> {
        self.lock().records.get(&image_id).cloned()
    }

    /// Every record passed to `upsert`, in call order.
    pub fn writes(&self) -> Vec<ImageMetadataRecord> {
        self.lock().writes.clone()
    }

    /// Statuses written for `image_id`, in call order.
    pub fn status_history(&self, image_id: i64) -> Vec<ProcessingStatus> {
        self.lock()
            .writes
            .iter()
            .filter(|r| r.image_id == image_id)
            .map(|r| r.status)
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn get(&self, image_id: i64) -> PipelineResult<Option<ImageMetadataRecord>> {
        Ok(self.record(image_id))
    }

    async fn upsert(&self, record: &ImageMetadataRecord) -> PipelineResult<()> {
        let mut inner = self.lock();
        inner.records.insert(record.image_id, record.clone());
        inner.writes.push(record.clone());
        Ok(())
    }

    async fn verify_ownership(&self, image_id: i64, user_id: &str) -> PipelineResult<bool> {
        Ok(self
            .lock()
            .owners
            .get(&image_id)
            .is_some_and(|owner| owner == user_id))
    }
}
