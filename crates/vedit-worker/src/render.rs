//! Render worker.
//!
//! Turns a video's working artifact into its final deliverable and hands
//! off to the notification queue. The record is the source of truth for
//! idempotency: a render job only acts while the record names it as owner.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use vedit_media::{fs_utils::remove_if_exists, ArtifactLayout, MediaExecutor};
use vedit_models::{EditOperation, VideoRecord, VideoStatus};
use vedit_queue::{Delivery, JobBroker, JobKind, NotifyJob, QueueJob, RenderJob};
use vedit_store::{LockToken, Precondition, VideoLock, VideoPatch, VideoRepository};

use crate::error::{WorkerError, WorkerResult};
use crate::executor::JobHandler;

/// Handler for `render` jobs.
pub struct RenderWorker {
    videos: Arc<dyn VideoRepository>,
    locks: Arc<dyn VideoLock>,
    media: Arc<dyn MediaExecutor>,
    broker: Arc<dyn JobBroker>,
    layout: ArtifactLayout,
    lock_ttl: Duration,
    lock_wait: Duration,
}

impl RenderWorker {
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
            lock_ttl: Duration::from_secs(35 * 60),
            lock_wait: Duration::from_secs(30),
        }
    }

    pub fn with_lock_timing(mut self, ttl: Duration, wait: Duration) -> Self {
        self.lock_ttl = ttl;
        self.lock_wait = wait;
        self
    }

    /// Longest a live delivery can go unacknowledged while it waits for and
    /// then holds the video lock.
    pub fn lock_window(&self) -> Duration {
        self.lock_wait + self.lock_ttl
    }

    async fn load(&self, job: &RenderJob) -> WorkerResult<VideoRecord> {
        self.videos
            .get(&job.video_id)
            .await?
            .ok_or_else(|| WorkerError::VideoNotFound(job.video_id.to_string()))
    }

    /// Queue the completion notification; an existing one counts as queued.
    async fn ensure_notified(&self, job: &RenderJob, final_path: &str) -> WorkerResult<()> {
        let notify = NotifyJob::new(job.video_id.clone(), job.job_id.clone(), final_path);
        match self.broker.enqueue(notify.into()).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_duplicate() => {
                info!(video_id = %job.video_id, "Notification already queued");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Where this job stands relative to the record.
    fn classify(record: &VideoRecord, job: &RenderJob) -> RenderState {
        if !record.is_owned_by(&job.job_id) {
            return RenderState::Stale;
        }
        match record.status {
            VideoStatus::Processing => RenderState::Pending,
            VideoStatus::Rendered => match &record.final_path {
                Some(path) => RenderState::Committed(path.clone()),
                None => RenderState::Stale,
            },
            VideoStatus::Uploaded => RenderState::Stale,
        }
    }

    async fn render(&self, job: &RenderJob) -> WorkerResult<()> {
        let record = self.load(job).await?;
        match Self::classify(&record, job) {
            RenderState::Committed(final_path) => {
                info!(video_id = %job.video_id, "Render already committed");
                return self.ensure_notified(job, &final_path).await;
            }
            RenderState::Stale => {
                info!(
                    video_id = %job.video_id,
                    status = %record.status,
                    "Render job no longer owns the video, skipping"
                );
                return Ok(());
            }
            RenderState::Pending => {}
        }

        let token = self
            .locks
            .acquire(&job.video_id, self.lock_ttl, self.lock_wait)
            .await?
            .ok_or_else(|| WorkerError::LockBusy(job.video_id.to_string()))?;

        let result = self.render_locked(job).await;
        self.release(&token).await;

        match result? {
            Some(final_path) => self.ensure_notified(job, &final_path).await,
            None => Ok(()),
        }
    }

    /// Transcode and commit. Returns the final path if this call committed it.
    async fn render_locked(&self, job: &RenderJob) -> WorkerResult<Option<String>> {
        // Re-read under the lock; an edit or another render may have won
        let record = self.load(job).await?;
        match Self::classify(&record, job) {
            RenderState::Pending => {}
            RenderState::Committed(path) => return Ok(Some(path)),
            RenderState::Stale => return Ok(None),
        }

        let input = record.working_path().to_string();
        let output = self.layout.artifact_path(&EditOperation::FinalRender);
        info!(video_id = %job.video_id, input = %input, "Rendering final artifact");

        self.media
            .execute(Path::new(&input), &EditOperation::FinalRender, &output)
            .await?;

        let final_path = output.to_string_lossy().to_string();
        let patch = VideoPatch::new()
            .status(VideoStatus::Rendered)
            .final_path(final_path.clone())
            .status_before_render(None)
            .when(Precondition::RenderOwner(job.job_id.clone()))
            .when(Precondition::Status(VideoStatus::Processing));

        match self.videos.update(&job.video_id, &patch).await {
            Ok(_) => {
                info!(video_id = %job.video_id, final_path = %final_path, "Video rendered");
                Ok(Some(final_path))
            }
            Err(e) if e.is_precondition_failed() => {
                warn!(video_id = %job.video_id, "Render lost ownership before commit, discarding output");
                if let Err(cleanup) = remove_if_exists(&output).await {
                    warn!(path = %output.display(), "Failed to remove orphan render: {}", cleanup);
                }
                Ok(None)
            }
            Err(e) => {
                remove_if_exists(&output).await.ok();
                Err(e.into())
            }
        }
    }

    async fn release(&self, token: &LockToken) {
        if let Err(e) = self.locks.release(token).await {
            warn!(video_id = %token.video_id, "Failed to release video lock: {}", e);
        }
    }

    /// Put the record back where it was before this render was accepted.
    async fn restore(&self, job: &RenderJob) -> WorkerResult<()> {
        let Some(record) = self.videos.get(&job.video_id).await? else {
            return Ok(());
        };
        let previous = record.status_before_render.unwrap_or(VideoStatus::Uploaded);
        let patch = VideoPatch::new()
            .status(previous)
            .render_job_id(None)
            .status_before_render(None)
            .when(Precondition::RenderOwner(job.job_id.clone()))
            .when(Precondition::Status(VideoStatus::Processing));

        match self.videos.update(&job.video_id, &patch).await {
            Ok(_) => {
                info!(video_id = %job.video_id, status = %previous, "Restored video after failed render");
                Ok(())
            }
            Err(e) if e.is_precondition_failed() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

enum RenderState {
    /// Owned and waiting for the transcode
    Pending,
    /// Owned and already rendered to this path
    Committed(String),
    /// Another job owns the video, or nobody does
    Stale,
}

#[async_trait]
impl JobHandler for RenderWorker {
    fn kind(&self) -> JobKind {
        JobKind::Render
    }

    async fn handle(&self, delivery: &Delivery) -> WorkerResult<()> {
        match &delivery.job {
            QueueJob::Render(job) => self.render(job).await,
            other => Err(WorkerError::job_failed(format!(
                "render worker received {} job",
                other.kind()
            ))),
        }
    }

    async fn on_dead_letter(&self, job: &QueueJob, _error: &str) -> WorkerResult<()> {
        match job {
            QueueJob::Render(job) => self.restore(job).await,
            _ => Ok(()),
        }
    }
}
