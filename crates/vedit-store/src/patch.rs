//! Conditional partial updates of a video record.

use chrono::Utc;
use vedit_models::{JobId, VideoRecord, VideoStatus};

use crate::error::{StoreError, StoreResult};

/// Condition the stored record must meet for a patch to apply.
#[derive(Debug, Clone, PartialEq)]
pub enum Precondition {
    /// Record is still at this revision
    Version(u64),
    /// Record is owned by this render job
    RenderOwner(JobId),
    /// Record has this status
    Status(VideoStatus),
}

impl Precondition {
    fn check(&self, record: &VideoRecord) -> StoreResult<()> {
        let ok = match self {
            Precondition::Version(v) => record.version == *v,
            Precondition::RenderOwner(job_id) => record.is_owned_by(job_id),
            Precondition::Status(status) => record.status == *status,
        };
        if ok {
            Ok(())
        } else {
            Err(StoreError::precondition_failed(format!(
                "{:?} does not hold for video {} (version {}, status {})",
                self, record.id, record.version, record.status
            )))
        }
    }
}

/// Fields to change on a record, plus the conditions under which to change them.
///
/// `None` leaves a field untouched. For the nullable fields the inner
/// `Option` is the new value, so `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct VideoPatch {
    pub status: Option<VideoStatus>,
    pub edited_path: Option<String>,
    pub final_path: Option<String>,
    pub render_job_id: Option<Option<JobId>>,
    pub status_before_render: Option<Option<VideoStatus>>,
    pub preconditions: Vec<Precondition>,
}

impl VideoPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: VideoStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn edited_path(mut self, path: impl Into<String>) -> Self {
        self.edited_path = Some(path.into());
        self
    }

    pub fn final_path(mut self, path: impl Into<String>) -> Self {
        self.final_path = Some(path.into());
        self
    }

    pub fn render_job_id(mut self, job_id: Option<JobId>) -> Self {
        self.render_job_id = Some(job_id);
        self
    }

    pub fn status_before_render(mut self, status: Option<VideoStatus>) -> Self {
        self.status_before_render = Some(status);
        self
    }

    pub fn when(mut self, precondition: Precondition) -> Self {
        self.preconditions.push(precondition);
        self
    }

    /// Check preconditions against `record` and return the updated record.
    ///
    /// Bumps `version` and `updated_at`.
    pub fn apply(&self, record: &VideoRecord) -> StoreResult<VideoRecord> {
        for precondition in &self.preconditions {
            precondition.check(record)?;
        }

        let mut next = record.clone();
        if let Some(status) = self.status {
            next.status = status;
        }
        if let Some(path) = &self.edited_path {
            next.edited_path = Some(path.clone());
        }
        if let Some(path) = &self.final_path {
            next.final_path = Some(path.clone());
        }
        if let Some(job_id) = &self.render_job_id {
            next.render_job_id = job_id.clone();
        }
        if let Some(status) = self.status_before_render {
            next.status_before_render = status;
        }
        next.version = record.version + 1;
        next.updated_at = Utc::now();
        Ok(next)
    }
}
