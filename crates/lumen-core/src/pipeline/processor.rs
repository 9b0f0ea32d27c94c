//! Pipeline orchestration - wires the collaborators into one processing run.

use image::DynamicImage;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::{Config, LimitsConfig};
use crate::error::{ConfigError, PipelineError, PipelineResult};
use crate::storage::{Storage, SupabaseStorage};
use crate::store::{MetadataStore, SupabaseMetadataStore};
use crate::supabase::SupabaseClient;
use crate::types::{ImageMetadataRecord, ProcessingRequest, ProcessingStatus, Rgb};
use crate::vision::{normalize_tags, ImageInput, VisionProviderFactory, VisionService};

use super::colors::DominantColorExtractor;
use super::decode::{detect_media_type, ImageDecoder};
use super::paths::thumbnail_path;
use super::thumbnail::{Thumbnail, ThumbnailGenerator, THUMBNAIL_CONTENT_TYPE};

/// A stage of a processing run, reported with failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Lookup,
    Download,
    Thumbnail,
    Colors,
    Upload,
    Analysis,
    Persist,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Lookup => "lookup",
            Step::Download => "download",
            Step::Thumbnail => "thumbnail",
            Step::Colors => "colors",
            Step::Upload => "upload",
            Step::Analysis => "analysis",
            Step::Persist => "persist",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a call to [`ImagePipeline::process`] ended.
#[derive(Debug)]
pub enum PipelineOutcome {
    /// The record was already `completed`; nothing was touched.
    AlreadyCompleted,
    /// Another run for the same image is active in this process.
    InProgress,
    /// The full record was persisted with status `completed`.
    Completed(ImageMetadataRecord),
    /// A step failed and the record was marked `failed`.
    Failed { step: Step, error: PipelineError },
    /// The run stopped before any status was written.
    Aborted(PipelineError),
}

impl PipelineOutcome {
    /// Short label for logs and CLI output.
    pub fn label(&self) -> &'static str {
        match self {
            PipelineOutcome::AlreadyCompleted => "already_completed",
            PipelineOutcome::InProgress => "in_progress",
            PipelineOutcome::Completed(_) => "completed",
            PipelineOutcome::Failed { .. } => "failed",
            PipelineOutcome::Aborted(_) => "aborted",
        }
    }
}

struct StepFailure {
    step: Step,
    error: PipelineError,
}

fn at(step: Step) -> impl FnOnce(PipelineError) -> StepFailure {
    move |error| StepFailure { step, error }
}

/// Removes an image id from the in-flight set when dropped.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<i64>>,
    image_id: i64,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(set: &'a Mutex<HashSet<i64>>, image_id: i64) -> Option<Self> {
        let inserted = set
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(image_id);
        inserted.then(|| Self { set, image_id })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.image_id);
    }
}

/// The image processing pipeline.
///
/// One instance is built at startup and shared behind an `Arc` by the queue
/// workers and the CLI.
pub struct ImagePipeline {
    storage: Arc<dyn Storage>,
    store: Arc<dyn MetadataStore>,
    vision: Arc<dyn VisionService>,
    decoder: ImageDecoder,
    thumbnails: ThumbnailGenerator,
    colors: DominantColorExtractor,
    limits: LimitsConfig,
    tag_count: usize,
    in_flight: Mutex<HashSet<i64>>,
}

impl ImagePipeline {
    /// Create a pipeline over the given collaborators.
    pub fn new(
        config: &Config,
        storage: Arc<dyn Storage>,
        store: Arc<dyn MetadataStore>,
        vision: Arc<dyn VisionService>,
    ) -> Self {
        Self {
            storage,
            store,
            vision,
            decoder: ImageDecoder::new(config.limits.clone()),
            thumbnails: ThumbnailGenerator::new(config.thumbnail.clone()),
            colors: DominantColorExtractor::new(config.colors.clone()),
            limits: config.limits.clone(),
            tag_count: config.vision.tag_count,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Create a pipeline backed by Supabase and the configured vision provider.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        config.require_credentials()?;

        let client = SupabaseClient::from_config(&config.supabase)?;
        let storage = SupabaseStorage::new(
            client.clone(),
            &config.supabase.bucket,
            Duration::from_millis(
                config
                    .limits
                    .download_timeout_ms
                    .max(config.limits.upload_timeout_ms),
            ),
        );
        let store = SupabaseMetadataStore::new(
            client,
            &config.supabase,
            Duration::from_millis(config.limits.store_timeout_ms),
        );
        let vision = VisionProviderFactory::create(
            &config.vision,
            Duration::from_millis(config.limits.llm_timeout_ms),
        )?;

        tracing::debug!(
            provider = vision.name(),
            bucket = %config.supabase.bucket,
            "Pipeline collaborators ready"
        );

        Ok(Self::new(config, Arc::new(storage), Arc::new(store), Arc::from(vision)))
    }

    /// The metadata store, shared with the API layer for ownership checks.
    pub fn store(&self) -> Arc<dyn MetadataStore> {
        self.store.clone()
    }

    /// Run the full pipeline for one image.
    ///
    /// Never returns an error: every failure is folded into the outcome and,
    /// once the record has been read, into its persisted status.
    pub async fn process(&self, request: &ProcessingRequest) -> PipelineOutcome {
        let image_id = request.image_id;
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight, image_id) else {
            tracing::info!(image_id, "Image is already being processed");
            return PipelineOutcome::InProgress;
        };

        let start = Instant::now();

        let record = match self.lookup(request).await {
            Ok(record) => record,
            Err(error) => {
                tracing::warn!(
                    image_id,
                    step = %Step::Lookup,
                    error_kind = error.kind(),
                    "Processing aborted: {error}"
                );
                return PipelineOutcome::Aborted(error);
            }
        };

        if record.status == ProcessingStatus::Completed {
            tracing::info!(image_id, "Image already processed, skipping");
            return PipelineOutcome::AlreadyCompleted;
        }

        if let Err(error) = self.persist(&record.with_status(ProcessingStatus::Processing)).await {
            tracing::warn!(
                image_id,
                step = %Step::Persist,
                error_kind = error.kind(),
                "Could not mark image as processing: {error}"
            );
            return PipelineOutcome::Aborted(error);
        }
        tracing::info!(image_id, path = %request.original_path, "Processing started");

        match self.run(request, &record).await {
            Ok(completed) => {
                tracing::info!(
                    image_id,
                    tags = completed.tags.len(),
                    colors = completed.dominant_colors.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Processing completed"
                );
                PipelineOutcome::Completed(completed)
            }
            Err(StepFailure { step, error }) => {
                tracing::error!(
                    image_id,
                    step = %step,
                    error_kind = error.kind(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Processing failed: {error}"
                );
                self.mark_failed(&record).await;
                PipelineOutcome::Failed { step, error }
            }
        }
    }

    async fn lookup(&self, request: &ProcessingRequest) -> PipelineResult<ImageMetadataRecord> {
        let record = with_timeout(
            "lookup",
            self.limits.store_timeout_ms,
            self.store.get(request.image_id),
        )
        .await?;
        let not_found = || PipelineError::NotFound(format!("metadata record {}", request.image_id));
        match record {
            Some(record) if record.user_id == request.user_id => Ok(record),
            Some(_) => {
                tracing::debug!(
                    image_id = request.image_id,
                    "Metadata record belongs to another user"
                );
                Err(not_found())
            }
            None => Err(not_found()),
        }
    }

    async fn run(
        &self,
        request: &ProcessingRequest,
        record: &ImageMetadataRecord,
    ) -> Result<ImageMetadataRecord, StepFailure> {
        let path = request.original_path.clone();

        let bytes = with_timeout(
            "download",
            self.limits.download_timeout_ms,
            self.storage.download(&path),
        )
        .await
        .map_err(at(Step::Download))?;
        tracing::debug!(
            image_id = request.image_id,
            bytes = bytes.len(),
            "Downloaded original"
        );
        let original: Arc<[u8]> = Arc::from(bytes);

        let (image, thumbnail) = self
            .make_thumbnail(original.clone(), &path)
            .await
            .map_err(at(Step::Thumbnail))?;
        let dominant_colors = self
            .extract_colors(image, &path)
            .await
            .map_err(at(Step::Colors))?;

        let key = thumbnail_path(&path, &request.filename);
        let stored_key = with_timeout(
            "upload",
            self.limits.upload_timeout_ms,
            self.storage.upload(&key, thumbnail.bytes, THUMBNAIL_CONTENT_TYPE),
        )
        .await
        .map_err(at(Step::Upload))?;
        tracing::debug!(
            image_id = request.image_id,
            thumbnail = %stored_key,
            width = thumbnail.width,
            height = thumbnail.height,
            "Uploaded thumbnail"
        );

        let input = ImageInput::from_bytes(&original, detect_media_type(&original));
        let analysis = with_timeout(
            "analysis",
            self.limits.llm_timeout_ms,
            self.vision.analyze(&input, self.tag_count),
        )
        .await
        .map_err(at(Step::Analysis))?;

        let completed = ImageMetadataRecord {
            image_id: record.image_id,
            user_id: record.user_id.clone(),
            original_path: path,
            thumbnail_path: Some(stored_key),
            dominant_colors,
            tags: normalize_tags(analysis.tags, self.tag_count),
            description: analysis.description,
            status: ProcessingStatus::Completed,
        };

        self.persist(&completed).await.map_err(at(Step::Persist))?;
        Ok(completed)
    }

    async fn make_thumbnail(
        &self,
        original: Arc<[u8]>,
        path: &str,
    ) -> PipelineResult<(Arc<DynamicImage>, Thumbnail)> {
        let decoder = self.decoder.clone();
        let thumbnails = self.thumbnails.clone();
        let owned_path = path.to_string();

        self.run_blocking("decode", path, move || {
            let decoded = decoder.decode(&original, &owned_path)?;
            let thumbnail = thumbnails.generate(&decoded.image, &owned_path)?;
            Ok((Arc::new(decoded.image), thumbnail))
        })
        .await
    }

    async fn extract_colors(
        &self,
        image: Arc<DynamicImage>,
        path: &str,
    ) -> PipelineResult<Vec<Rgb>> {
        let extractor = self.colors.clone();
        self.run_blocking("colors", path, move || Ok(extractor.extract(&image)))
            .await
    }

    /// Run CPU-bound work on the blocking pool under the decode timeout.
    async fn run_blocking<T, F>(&self, stage: &str, path: &str, work: F) -> PipelineResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> PipelineResult<T> + Send + 'static,
    {
        let timeout_ms = self.limits.decode_timeout_ms;
        let handle = tokio::task::spawn_blocking(work);
        match tokio::time::timeout(Duration::from_millis(timeout_ms), handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(PipelineError::Decode {
                path: path.to_string(),
                message: format!("Image worker failed: {e}"),
            }),
            Err(_) => Err(PipelineError::Timeout {
                stage: stage.to_string(),
                timeout_ms,
            }),
        }
    }

    async fn persist(&self, record: &ImageMetadataRecord) -> PipelineResult<()> {
        with_timeout("store", self.limits.store_timeout_ms, self.store.upsert(record)).await
    }

    /// Write the record as read at the start of the run with only the status
    /// changed.
    async fn mark_failed(&self, record: &ImageMetadataRecord) {
        if let Err(error) = self.persist(&record.with_status(ProcessingStatus::Failed)).await {
            tracing::error!(
                image_id = record.image_id,
                step = %Step::Persist,
                error_kind = error.kind(),
                "Could not record failed status: {error}"
            );
        }
    }
}

async fn with_timeout<T, F>(stage: &str, timeout_ms: u64, fut: F) -> PipelineResult<T>
where
    F: Future<Output = PipelineResult<T>>,
{
    match tokio::time::timeout(Duration::from_millis(timeout_ms), fut).await {
        Ok(result) => result,
        Err(_) => Err(PipelineError::Timeout {
            stage: stage.to_string(),
            timeout_ms,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        banded_image, encode_jpeg, solid_image, striped_image, Harness, MockVision,
    };
    use image::GenericImageView;

    const RED: Rgb = Rgb(250, 10, 10);

    fn request(image_id: i64, user: &str, path: &str, filename: &str) -> ProcessingRequest {
        ProcessingRequest::new(image_id, user, path, filename)
    }

    #[tokio::test]
    async fn test_end_to_end_completes_record() {
        let harness = Harness::new(MockVision::answering(&["cat", "sofa"], "A cat on a sofa."));
        let bands = [
            (400, Rgb(240, 16, 16)),
            (250, Rgb(16, 240, 16)),
            (150, Rgb(16, 16, 240)),
        ];
        harness.seed(
            42,
            "u1",
            "u1/original/cat.jpg",
            encode_jpeg(&banded_image(600, &bands)),
        );

        let outcome = harness
            .pipeline
            .process(&request(42, "u1", "u1/original/cat.jpg", "cat.jpg"))
            .await;

        let record = match outcome {
            PipelineOutcome::Completed(record) => record,
            other => panic!("unexpected outcome: {other:?}"),
        };
        assert_eq!(record.thumbnail_path.as_deref(), Some("u1/thumbnail/cat.jpg"));
        assert_eq!(record.tags, vec!["cat", "sofa"]);
        assert_eq!(record.description, "A cat on a sofa.");
        assert_eq!(record.status, ProcessingStatus::Completed);
        assert_eq!(
            record.dominant_colors,
            vec![Rgb(240, 16, 16), Rgb(16, 240, 16), Rgb(16, 16, 240)]
        );

        let stored = harness.storage.get("u1/thumbnail/cat.jpg").unwrap();
        assert_eq!(stored.content_type, "image/jpeg");
        let thumb = image::load_from_memory(&stored.bytes).unwrap();
        assert_eq!(thumb.dimensions(), (300, 225));

        assert_eq!(harness.store.record(42).unwrap(), record);
        assert_eq!(
            harness.store.status_history(42),
            vec![ProcessingStatus::Processing, ProcessingStatus::Completed]
        );
        assert_eq!(harness.vision.calls(), 1);
    }

    #[tokio::test]
    async fn test_completed_record_is_not_reprocessed() {
        let harness = Harness::new(MockVision::answering(&["dog"], "A dog."));
        harness.seed(7, "u1", "u1/original/dog.png", encode_jpeg(&solid_image(64, 64, RED)));
        let req = request(7, "u1", "u1/original/dog.png", "dog.png");

        assert!(matches!(harness.pipeline.process(&req).await, PipelineOutcome::Completed(_)));
        let writes = harness.store.writes().len();
        let downloads = harness.storage.download_count();

        let outcome = harness.pipeline.process(&req).await;
        assert!(matches!(outcome, PipelineOutcome::AlreadyCompleted));
        assert_eq!(harness.store.writes().len(), writes);
        assert_eq!(harness.storage.download_count(), downloads);
        assert_eq!(harness.vision.calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_record_aborts_without_writes() {
        let harness = Harness::new(MockVision::answering(&["x"], "x"));
        let outcome = harness
            .pipeline
            .process(&request(99, "u1", "u1/original/a.jpg", "a.jpg"))
            .await;

        match outcome {
            PipelineOutcome::Aborted(error) => assert_eq!(error.kind(), "not_found"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(harness.store.writes().is_empty());
        assert_eq!(harness.storage.download_count(), 0);
    }

    #[tokio::test]
    async fn test_record_of_another_user_is_not_found() {
        let harness = Harness::new(MockVision::answering(&["x"], "x"));
        harness.seed(5, "u1", "u1/original/a.jpg", encode_jpeg(&solid_image(32, 32, RED)));

        let outcome = harness
            .pipeline
            .process(&request(5, "u2", "u1/original/a.jpg", "a.jpg"))
            .await;
        assert!(matches!(outcome, PipelineOutcome::Aborted(PipelineError::NotFound(_))));
        assert!(harness.store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_download_failure_marks_failed_without_upload() {
        let harness = Harness::new(MockVision::answering(&["x"], "x"));
        harness.store.insert(ImageMetadataRecord::pending(8, "u1", "u1/original/gone.jpg"));

        let outcome = harness
            .pipeline
            .process(&request(8, "u1", "u1/original/gone.jpg", "gone.jpg"))
            .await;

        assert!(matches!(outcome, PipelineOutcome::Failed { step: Step::Download, .. }));
        assert_eq!(harness.storage.upload_count(), 0);
        assert_eq!(harness.vision.calls(), 0);
        assert_eq!(
            harness.store.status_history(8),
            vec![ProcessingStatus::Processing, ProcessingStatus::Failed]
        );
    }

    #[tokio::test]
    async fn test_ai_failure_after_upload_keeps_thumbnail() {
        let harness = Harness::new(MockVision::failing());
        harness.seed(9, "u1", "u1/original/b.jpg", encode_jpeg(&solid_image(400, 400, RED)));

        let outcome = harness
            .pipeline
            .process(&request(9, "u1", "u1/original/b.jpg", "b.jpg"))
            .await;

        match outcome {
            PipelineOutcome::Failed { step, error } => {
                assert_eq!(step, Step::Analysis);
                assert_eq!(error.kind(), "ai_service");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(harness.storage.contains("u1/thumbnail/b.jpg"));

        // Only the status changes; no partial results of the run are written.
        let record = harness.store.record(9).unwrap();
        assert_eq!(record.status, ProcessingStatus::Failed);
        assert_eq!(record.thumbnail_path, None);
        assert!(record.dominant_colors.is_empty());
        assert!(record.tags.is_empty());
    }

    #[tokio::test]
    async fn test_unparseable_analysis_is_distinct_failure() {
        let harness = Harness::new(MockVision::replying("Sure! Here are some tags: cat, dog"));
        harness.seed(10, "u1", "u1/original/c.jpg", encode_jpeg(&solid_image(50, 50, RED)));

        let outcome = harness
            .pipeline
            .process(&request(10, "u1", "u1/original/c.jpg", "c.jpg"))
            .await;
        match outcome {
            PipelineOutcome::Failed { step, error } => {
                assert_eq!(step, Step::Analysis);
                assert_eq!(error.kind(), "ai_response_parse");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_undecodable_image_fails_at_thumbnail() {
        let harness = Harness::new(MockVision::answering(&["x"], "x"));
        harness.seed(11, "u1", "u1/original/d.jpg", b"definitely not an image".to_vec());

        let outcome = harness
            .pipeline
            .process(&request(11, "u1", "u1/original/d.jpg", "d.jpg"))
            .await;
        assert!(matches!(outcome, PipelineOutcome::Failed { step: Step::Thumbnail, .. }));
        assert_eq!(harness.storage.upload_count(), 0);
    }

    #[tokio::test]
    async fn test_tags_are_capped_and_deduplicated() {
        let mut config = Config::default();
        config.vision.tag_count = 3;
        let harness = Harness::with_config(
            config,
            MockVision::answering(&["Beach", "beach", "sea", " ", "sand", "sun"], "A beach."),
        );
        harness.seed(12, "u1", "u1/original/e.jpg", encode_jpeg(&solid_image(40, 40, RED)));

        let outcome = harness
            .pipeline
            .process(&request(12, "u1", "u1/original/e.jpg", "e.jpg"))
            .await;
        match outcome {
            PipelineOutcome::Completed(record) => {
                assert_eq!(record.tags, vec!["Beach", "sea", "sand"])
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(harness.vision.last_tag_count(), Some(3));
    }

    #[tokio::test]
    async fn test_colors_ranked_by_frequency() {
        let harness = Harness::new(MockVision::answering(&["stripes"], "Stripes."));
        // 3 red rows for every blue row
        let image = striped_image(40, 40, &[RED, RED, RED, Rgb(10, 10, 250)]);
        harness.seed(13, "u1", "u1/original/s.png", crate::testing::encode_png(&image));

        let outcome = harness
            .pipeline
            .process(&request(13, "u1", "u1/original/s.png", "s.png"))
            .await;
        let record = match outcome {
            PipelineOutcome::Completed(record) => record,
            other => panic!("unexpected outcome: {other:?}"),
        };
        assert_eq!(record.dominant_colors, vec![Rgb(240, 16, 16), Rgb(16, 16, 240)]);
        assert_eq!(harness.storage.get("u1/thumbnail/s.jpg").unwrap().content_type, "image/jpeg");
    }

    #[tokio::test]
    async fn test_timeout_fails_then_rerun_succeeds() {
        let mut config = Config::default();
        config.limits.llm_timeout_ms = 50;
        let vision =
            MockVision::answering(&["slow"], "Slow.").with_delay(Duration::from_millis(500));
        let harness = Harness::with_config(config, vision);
        harness.seed(14, "u1", "u1/original/t.jpg", encode_jpeg(&solid_image(20, 20, RED)));
        let req = request(14, "u1", "u1/original/t.jpg", "t.jpg");

        let outcome = harness.pipeline.process(&req).await;
        match outcome {
            PipelineOutcome::Failed { step, error } => {
                assert_eq!(step, Step::Analysis);
                assert_eq!(error.kind(), "timeout");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(harness.store.record(14).unwrap().status, ProcessingStatus::Failed);

        harness.vision.set_delay(None);
        let outcome = harness.pipeline.process(&req).await;
        assert!(matches!(outcome, PipelineOutcome::Completed(_)));
        assert_eq!(harness.store.record(14).unwrap().status, ProcessingStatus::Completed);
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_is_in_progress() {
        let vision = MockVision::answering(&["a"], "A.").with_delay(Duration::from_millis(200));
        let harness = Harness::new(vision);
        harness.seed(15, "u1", "u1/original/p.jpg", encode_jpeg(&solid_image(20, 20, RED)));
        let req = request(15, "u1", "u1/original/p.jpg", "p.jpg");

        let (first, second) = tokio::join!(harness.pipeline.process(&req), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            harness.pipeline.process(&req).await
        });

        assert!(matches!(first, PipelineOutcome::Completed(_)));
        assert!(matches!(second, PipelineOutcome::InProgress));
        assert_eq!(harness.vision.calls(), 1);

        // The guard is released once the run finishes.
        assert!(matches!(harness.pipeline.process(&req).await, PipelineOutcome::AlreadyCompleted));
    }

    #[test]
    fn test_step_labels() {
        assert_eq!(Step::Analysis.to_string(), "analysis");
        assert_eq!(PipelineOutcome::InProgress.label(), "in_progress");
    }
}
