//! Metadata store on Supabase's PostgREST API.
//!
//! Results go to `image_metadata` as a single-row `PATCH` filtered on
//! `image_id`, which Postgres applies as one statement. The thumbnail key
//! lives on the `images` row and is written first, so a `completed` status
//! is only ever visible once the thumbnail key is in place.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::MetadataStore;
use crate::config::SupabaseConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::supabase::SupabaseClient;
use crate::types::{ImageMetadataRecord, ProcessingStatus, Rgb};

/// The `image_metadata` columns the pipeline writes.
#[derive(Debug, Serialize)]
struct MetadataRow<'a> {
    image_id: i64,
    user_id: &'a str,
    ai_processing_status: ProcessingStatus,
    description: &'a str,
    tags: &'a [String],
    colors: &'a [Rgb],
}

impl<'a> From<&'a ImageMetadataRecord> for MetadataRow<'a> {
    fn from(record: &'a ImageMetadataRecord) -> Self {
        Self {
            image_id: record.image_id,
            user_id: &record.user_id,
            ai_processing_status: record.status,
            description: &record.description,
            tags: &record.tags,
            colors: &record.dominant_colors,
        }
    }
}

#[derive(Debug, Serialize)]
struct ThumbnailRow<'a> {
    thumbnail_path: &'a str,
}

/// PostgREST-backed metadata store.
pub struct SupabaseMetadataStore {
    client: SupabaseClient,
    metadata_table: String,
    images_table: String,
    timeout: Duration,
}

impl SupabaseMetadataStore {
    pub fn new(client: SupabaseClient, config: &SupabaseConfig, timeout: Duration) -> Self {
        Self {
            client,
            metadata_table: config.metadata_table.clone(),
            images_table: config.images_table.clone(),
            timeout,
        }
    }

    fn table_url(&self, table: &str, query: &[(&str, String)]) -> reqwest::Url {
        let mut url = self.client.endpoint(&["rest", "v1", table]);
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        url
    }

    fn store_error(&self, e: reqwest::Error) -> PipelineError {
        if e.is_timeout() {
            PipelineError::Timeout {
                stage: "store".to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            PipelineError::Store {
                message: e.to_string(),
            }
        }
    }

    async fn select<T>(&self, url: reqwest::Url) -> PipelineResult<Vec<T>>
    where
        T: for<'de> Deserialize<'de>,
    {
        let request = self.client.http().get(url).timeout(self.timeout);
        let resp = self
            .client
            .authorize(request)
            .send()
            .await
            .map_err(|e| self.store_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PipelineError::Store {
                message: format!("select HTTP {status}: {body}"),
            });
        }
        resp.json().await.map_err(|e| PipelineError::Store {
            message: format!("Failed to parse rows: {e}"),
        })
    }

    async fn patch<T>(&self, url: reqwest::Url, body: &T) -> PipelineResult<()>
    where
        T: Serialize + ?Sized,
    {
        let request = self
            .client
            .http()
            .patch(url)
            .header("Prefer", "return=minimal")
            .json(body)
            .timeout(self.timeout);

        let resp = self
            .client
            .authorize(request)
            .send()
            .await
            .map_err(|e| self.store_error(e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PipelineError::Store {
                message: format!("update HTTP {status}: {body}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for SupabaseMetadataStore {
    async fn get(&self, image_id: i64) -> PipelineResult<Option<ImageMetadataRecord>> {
        let url = self.table_url(
            &self.metadata_table,
            &[
                ("image_id", format!("eq.{image_id}")),
                ("select", "*".to_string()),
                ("limit", "1".to_string()),
            ],
        );
        let rows: Vec<ImageMetadataRecord> = self.select(url).await?;
        Ok(rows.into_iter().next())
    }

    async fn upsert(&self, record: &ImageMetadataRecord) -> PipelineResult<()> {
        if let Some(thumbnail_path) = record.thumbnail_path.as_deref() {
            let url = self.table_url(
                &self.images_table,
                &[("id", format!("eq.{}", record.image_id))],
            );
            self.patch(url, &ThumbnailRow { thumbnail_path }).await?;
        }

        let url = self.table_url(
            &self.metadata_table,
            &[("image_id", format!("eq.{}", record.image_id))],
        );
        self.patch(url, &MetadataRow::from(record)).await
    }

    async fn verify_ownership(&self, image_id: i64, user_id: &str) -> PipelineResult<bool> {
        let url = self.table_url(
            &self.images_table,
            &[
                ("id", format!("eq.{image_id}")),
                ("user_id", format!("eq.{user_id}")),
                ("select", "id".to_string()),
            ],
        );
        let rows: Vec<serde_json::Value> = self.select(url).await?;
        Ok(!rows.is_empty())
    }
}
