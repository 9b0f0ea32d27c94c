//! Supabase Storage backend using the object REST API.

use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;

use super::Storage;
use crate::error::{PipelineError, PipelineResult};
use crate::supabase::SupabaseClient;

/// One bucket of a Supabase Storage project.
pub struct SupabaseStorage {
    client: SupabaseClient,
    bucket: String,
    timeout: Duration,
}

impl SupabaseStorage {
    pub fn new(client: SupabaseClient, bucket: &str, timeout: Duration) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            timeout,
        }
    }

    fn object_url(&self, path: &str) -> reqwest::Url {
        self.client
            .endpoint(&["storage", "v1", "object", &self.bucket, path])
    }
}

/// Storage answers a missing object with 404, or with 400 and a
/// `not_found` error body depending on the API version.
fn is_not_found(status: StatusCode, body: &str) -> bool {
    status == StatusCode::NOT_FOUND
        || (status == StatusCode::BAD_REQUEST
            && (body.contains("not_found") || body.contains("Object not found")))
}

fn transport_error(path: &str, stage: &str, timeout: Duration, e: reqwest::Error) -> PipelineError {
    if e.is_timeout() {
        PipelineError::Timeout {
            stage: stage.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }
    } else {
        PipelineError::StorageIo {
            path: path.to_string(),
            message: format!("{stage} request failed: {e}"),
        }
    }
}

#[async_trait]
impl Storage for SupabaseStorage {
    async fn download(&self, path: &str) -> PipelineResult<Vec<u8>> {
        let request = self
            .client
            .http()
            .get(self.object_url(path))
            .timeout(self.timeout);

        let resp = self
            .client
            .authorize(request)
            .send()
            .await
            .map_err(|e| transport_error(path, "download", self.timeout, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            if is_not_found(status, &body) {
                return Err(PipelineError::NotFound(format!(
                    "storage object {}/{}",
                    self.bucket, path
                )));
            }
            return Err(PipelineError::StorageIo {
                path: path.to_string(),
                message: format!("download HTTP {status}: {body}"),
            });
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| transport_error(path, "download", self.timeout, e))?;
        Ok(bytes.to_vec())
    }

    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> PipelineResult<String> {
        let request = self
            .client
            .http()
            .post(self.object_url(path))
            .header("Content-Type", content_type)
            .header("x-upsert", "true")
            .body(bytes)
            .timeout(self.timeout);

        let resp = self
            .client
            .authorize(request)
            .send()
            .await
            .map_err(|e| transport_error(path, "upload", self.timeout, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PipelineError::StorageIo {
                path: path.to_string(),
                message: format!("upload HTTP {status}: {body}"),
            });
        }

        tracing::debug!(bucket = %self.bucket, path, "Uploaded object");
        Ok(path.to_string())
    }
}
