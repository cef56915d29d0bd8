//! Queue errors.

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Queue backend unreachable: {0}")]
    ConnectionFailed(String),

    #[error("Job was not accepted: {0}")]
    EnqueueFailed(String),

    /// The dedup key is already held by a queued or completed job.
    #[error("Job already queued under {0}")]
    Duplicate(String),

    #[error(transparent)]
    Redis(#[from] redis::RedisError),

    #[error("Malformed job payload: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    pub fn enqueue_failed(msg: impl Into<String>) -> Self {
        Self::EnqueueFailed(msg.into())
    }

    pub fn duplicate(dedup_key: impl Into<String>) -> Self {
        Self::Duplicate(dedup_key.into())
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}
