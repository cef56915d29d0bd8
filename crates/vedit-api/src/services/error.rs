//! Pipeline coordinator errors.

use thiserror::Error;
use vedit_media::MediaError;
use vedit_models::EditError;
use vedit_queue::QueueError;
use vedit_store::StoreError;

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed request; nothing was touched
    #[error("{0}")]
    Validation(String),

    #[error("Video not found: {0}")]
    NotFound(String),

    /// The video exists but has no rendered deliverable yet
    #[error("Video not rendered: {0}")]
    NotReady(String),

    /// The video is busy or changed underneath the request
    #[error("{0}")]
    Conflict(String),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

impl PipelineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }
}

impl From<EditError> for PipelineError {
    fn from(err: EditError) -> Self {
        PipelineError::Validation(err.to_string())
    }
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => PipelineError::NotFound(id),
            StoreError::PreconditionFailed(_) => PipelineError::Conflict(
                "Video was modified by another request, please retry".to_string(),
            ),
            other => PipelineError::Store(other),
        }
    }
}
