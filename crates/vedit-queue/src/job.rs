//! Job types for the queue.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vedit_models::{JobId, VideoId};

/// Which worker pool a job belongs to. Each kind has its own stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Render,
    Notify,
}

impl JobKind {
    pub const ALL: [JobKind; 2] = [JobKind::Render, JobKind::Notify];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Render => "render",
            JobKind::Notify => "notify",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "render" => Some(JobKind::Render),
            "notify" => Some(JobKind::Notify),
            _ => None,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job to produce the final render of a video's working artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderJob {
    /// Unique job ID, also stored on the video record as the render owner
    pub job_id: JobId,
    /// Video to render
    pub video_id: VideoId,
    /// When the job was created
    pub created_at: DateTime<Utc>,
}

impl RenderJob {
    pub fn new(video_id: VideoId) -> Self {
        Self {
            job_id: JobId::new(),
            video_id,
            created_at: Utc::now(),
        }
    }

    /// At most one queued render per video.
    pub fn idempotency_key(&self) -> String {
        Self::idempotency_key_for(&self.video_id)
    }

    pub fn idempotency_key_for(video_id: &VideoId) -> String {
        format!("render:{video_id}")
    }
}

/// Job to tell the owner that a render finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyJob {
    pub job_id: JobId,
    pub video_id: VideoId,
    /// Render job that produced `final_path`
    pub render_job_id: JobId,
    /// Location of the rendered file
    pub final_path: String,
    pub created_at: DateTime<Utc>,
}

impl NotifyJob {
    pub fn new(video_id: VideoId, render_job_id: JobId, final_path: impl Into<String>) -> Self {
        Self {
            job_id: JobId::new(),
            video_id,
            render_job_id,
            final_path: final_path.into(),
            created_at: Utc::now(),
        }
    }

    /// One notification per completed render, however often the render is redelivered.
    pub fn idempotency_key(&self) -> String {
        format!("notify:{}", self.render_job_id)
    }
}

/// Envelope stored in the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueJob {
    Render(RenderJob),
    Notify(NotifyJob),
}

impl QueueJob {
    pub fn job_id(&self) -> &JobId {
        match self {
            QueueJob::Render(j) => &j.job_id,
            QueueJob::Notify(j) => &j.job_id,
        }
    }

    pub fn video_id(&self) -> &VideoId {
        match self {
            QueueJob::Render(j) => &j.video_id,
            QueueJob::Notify(j) => &j.video_id,
        }
    }

    pub fn kind(&self) -> JobKind {
        match self {
            QueueJob::Render(_) => JobKind::Render,
            QueueJob::Notify(_) => JobKind::Notify,
        }
    }

    pub fn idempotency_key(&self) -> String {
        match self {
            QueueJob::Render(j) => j.idempotency_key(),
            QueueJob::Notify(j) => j.idempotency_key(),
        }
    }

    /// Whether the dedup key is released once the job leaves the queue.
    ///
    /// A finished render frees the video for another render. A notification
    /// key stays until it expires so redelivered renders cannot notify twice.
    pub fn releases_key_on_finish(&self) -> bool {
        matches!(self, QueueJob::Render(_))
    }
}

impl From<RenderJob> for QueueJob {
    fn from(job: RenderJob) -> Self {
        QueueJob::Render(job)
    }
}

impl From<NotifyJob> for QueueJob {
    fn from(job: NotifyJob) -> Self {
        QueueJob::Notify(job)
    }
}
