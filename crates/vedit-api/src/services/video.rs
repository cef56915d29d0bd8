//! Video pipeline coordinator.
//!
//! Synchronous edits (trim, subtitles) run the transcode inline while
//! holding the per-video lock and return the updated record. Render is
//! accepted here and performed later by the render worker: acceptance marks
//! the record `processing`, stamps it with the new job id and enqueues the
//! job, all under the same lock.
//!
//! Every record write carries a precondition, so a write based on a stale
//! read fails instead of clobbering a concurrent change.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use schemars::JsonSchema;
use serde::Serialize;
use tracing::{info, warn};

use vedit_media::{fs_utils::remove_if_exists, ArtifactLayout, MediaExecutor};
use vedit_models::{EditOperation, JobId, UploadedFile, VideoId, VideoRecord, VideoStatus};
use vedit_queue::{JobBroker, RenderJob};
use vedit_store::{LockToken, Precondition, VideoLock, VideoPatch, VideoRepository};

use super::error::{PipelineError, PipelineResult};

// =============================================================================
// Constants
// =============================================================================

/// Default lock TTL; must exceed the transcode timeout.
const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(35 * 60);

/// Default time a request waits for a busy video.
const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(30);

// =============================================================================
// Types
// =============================================================================

/// Acknowledgment that a render job was queued.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct RenderAccepted {
    pub job_id: JobId,
    pub video_id: VideoId,
}

// =============================================================================
// Video Service
// =============================================================================

/// Coordinates uploads, edits, render acceptance and downloads.
#[derive(Clone)]
pub struct VideoService {
    videos: Arc<dyn VideoRepository>,
    locks: Arc<dyn VideoLock>,
    media: Arc<dyn MediaExecutor>,
    broker: Arc<dyn JobBroker>,
    layout: ArtifactLayout,
    lock_ttl: Duration,
    lock_wait: Duration,
}

impl VideoService {
    /// Create a new video service.
    pub fn new(
        videos: Arc<dyn VideoRepository>,
        locks: Arc<dyn VideoLock>,
        media: Arc<dyn MediaExecutor>,
        broker: Arc<dyn JobBroker>,
        layout: ArtifactLayout,
    ) -> Self {
        Self {
            videos,
            locks,
            media,
            broker,
            layout,
            lock_ttl: DEFAULT_LOCK_TTL,
            lock_wait: DEFAULT_LOCK_WAIT,
        }
    }

    pub fn with_lock_timing(mut self, ttl: Duration, wait: Duration) -> Self {
        self.lock_ttl = ttl;
        self.lock_wait = wait;
        self
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    // =========================================================================
    // Upload & Read
    // =========================================================================

    /// Register a stored upload as a new video.
    ///
    /// The duration probe is best-effort; a file ffprobe cannot read is still
    /// accepted and fails later at edit or render time.
    pub async fn upload(&self, file: UploadedFile) -> PipelineResult<VideoRecord> {
        if file.path.trim().is_empty() {
            return Err(PipelineError::validation("Please upload a video file."));
        }

        let duration = match self.media.probe_duration(Path::new(&file.path)).await {
            Ok(d) => Some(d),
            Err(e) => {
                warn!(path = %file.path, "Could not probe uploaded video: {}", e);
                None
            }
        };

        let record = VideoRecord::new(&file).with_duration(duration);
        self.videos.create(&record).await?;

        info!(
            video_id = %record.id,
            name = %record.name,
            size = record.size,
            duration = ?record.duration,
            "Video uploaded"
        );
        Ok(record)
    }

    /// Current state of a video.
    pub async fn get(&self, id: &VideoId) -> PipelineResult<VideoRecord> {
        self.load(id).await
    }

    /// Path of the rendered deliverable.
    pub async fn download(&self, id: &VideoId) -> PipelineResult<PathBuf> {
        let record = self.load(id).await?;
        record
            .rendered_path()
            .map(PathBuf::from)
            .ok_or_else(|| PipelineError::NotReady(id.to_string()))
    }

    // =========================================================================
    // Edits
    // =========================================================================

    /// Keep only `[start, end)` of the working artifact.
    pub async fn trim(&self, id: &VideoId, start: f64, end: f64) -> PipelineResult<VideoRecord> {
        let operation = EditOperation::trim(start, end)?;
        self.apply_edit(id, operation).await
    }

    /// Burn `text` into the working artifact while `[start, end)` plays.
    pub async fn add_subtitles(
        &self,
        id: &VideoId,
        text: &str,
        start: f64,
        end: f64,
    ) -> PipelineResult<VideoRecord> {
        let operation = EditOperation::overlay_text(text.trim(), start, end)?;
        self.apply_edit(id, operation).await
    }

    async fn apply_edit(
        &self,
        id: &VideoId,
        operation: EditOperation,
    ) -> PipelineResult<VideoRecord> {
        let token = self.lock(id).await?;
        let result = self.apply_edit_locked(id, &operation).await;
        self.unlock(&token).await;
        result
    }

    async fn apply_edit_locked(
        &self,
        id: &VideoId,
        operation: &EditOperation,
    ) -> PipelineResult<VideoRecord> {
        let record = self.load_settled(id).await?;
        if record.is_rendering() {
            return Err(PipelineError::conflict(format!(
                "Video {id} is being rendered; edits are rejected until the render finishes"
            )));
        }

        let input = PathBuf::from(record.working_path());
        let output = self.layout.artifact_path(operation);
        self.media.execute(&input, operation, &output).await?;

        let patch = VideoPatch::new()
            .edited_path(output.to_string_lossy())
            .when(Precondition::Version(record.version));

        match self.videos.update(id, &patch).await {
            Ok(updated) => {
                info!(
                    video_id = %id,
                    operation = operation.as_str(),
                    edited_path = %output.display(),
                    "Edit applied"
                );
                Ok(updated)
            }
            Err(e) => {
                if let Err(cleanup) = remove_if_exists(&output).await {
                    warn!(path = %output.display(), "Failed to remove unused artifact: {}", cleanup);
                }
                Err(e.into())
            }
        }
    }

    // =========================================================================
    // Render
    // =========================================================================

    /// Accept a render: mark the video `processing` and queue the job.
    pub async fn render(&self, id: &VideoId) -> PipelineResult<RenderAccepted> {
        let token = self.lock(id).await?;
        let result = self.accept_render(id).await;
        self.unlock(&token).await;
        result
    }

    async fn accept_render(&self, id: &VideoId) -> PipelineResult<RenderAccepted> {
        let record = self.load_settled(id).await?;
        if record.is_rendering() {
            return Err(PipelineError::conflict(format!(
                "A render is already in progress for video {id}"
            )));
        }

        let job = RenderJob::new(id.clone());
        let claim = VideoPatch::new()
            .status(VideoStatus::Processing)
            .render_job_id(Some(job.job_id.clone()))
            .status_before_render(Some(record.status))
            .when(Precondition::Version(record.version));
        self.videos.update(id, &claim).await?;

        let job_id = job.job_id.clone();
        match self.broker.enqueue(job.into()).await {
            Ok(message_id) => {
                info!(video_id = %id, job_id = %job_id, message_id = %message_id, "Render job queued");
                metrics::counter!("vedit_jobs_enqueued_total", "kind" => "render").increment(1);
                Ok(RenderAccepted {
                    job_id,
                    video_id: id.clone(),
                })
            }
            Err(e) => {
                warn!(video_id = %id, job_id = %job_id, "Render enqueue failed, reverting: {}", e);
                let revert = VideoPatch::new()
                    .status(record.status)
                    .render_job_id(record.render_job_id.clone())
                    .status_before_render(record.status_before_render)
                    .when(Precondition::RenderOwner(job_id));
                if let Err(revert_err) = self.videos.update(id, &revert).await {
                    warn!(video_id = %id, "Failed to revert render claim: {}", revert_err);
                }

                if e.is_duplicate() {
                    Err(PipelineError::conflict(format!(
                        "A render is already queued for video {id}"
                    )))
                } else {
                    Err(e.into())
                }
            }
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn load(&self, id: &VideoId) -> PipelineResult<VideoRecord> {
        if id.as_str().trim().is_empty() {
            return Err(PipelineError::validation("Missing video ID."));
        }
        self.videos
            .get(id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(id.to_string()))
    }

    /// Load a record, releasing a render claim that no queued job backs.
    ///
    /// A claim is orphaned when the process died between marking the record
    /// `processing` and enqueueing, or when a dead-lettered render could not
    /// restore the record. Callers hold the video lock, so an acceptance in
    /// progress is never mistaken for one.
    async fn load_settled(&self, id: &VideoId) -> PipelineResult<VideoRecord> {
        let record = self.load(id).await?;
        if !record.is_rendering() {
            return Ok(record);
        }

        let holder = self
            .broker
            .key_holder(&RenderJob::idempotency_key_for(id))
            .await?;
        if holder.is_some() && holder == record.render_job_id {
            return Ok(record);
        }

        let previous = record.status_before_render.unwrap_or(VideoStatus::Uploaded);
        warn!(
            video_id = %id,
            render_job_id = ?record.render_job_id,
            status = %previous,
            "Releasing render claim with no queued job"
        );
        let release = VideoPatch::new()
            .status(previous)
            .render_job_id(None)
            .status_before_render(None)
            .when(Precondition::Version(record.version));
        Ok(self.videos.update(id, &release).await?)
    }

    async fn lock(&self, id: &VideoId) -> PipelineResult<LockToken> {
        self.locks
            .acquire(id, self.lock_ttl, self.lock_wait)
            .await?
            .ok_or_else(|| {
                PipelineError::conflict(format!("Video {id} is busy, please retry shortly"))
            })
    }

    async fn unlock(&self, token: &LockToken) {
        if let Err(e) = self.locks.release(token).await {
            // The TTL frees it eventually
            warn!(video_id = %token.video_id, "Failed to release video lock: {}", e);
        }
    }
}
