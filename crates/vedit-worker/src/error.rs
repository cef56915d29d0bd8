//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("Video not found: {0}")]
    VideoNotFound(String),

    #[error("Video busy: {0}")]
    LockBusy(String),

    #[error("Notification failed: {0}")]
    NotifyFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Media error: {0}")]
    Media(#[from] vedit_media::MediaError),

    #[error("Store error: {0}")]
    Store(#[from] vedit_store::StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] vedit_queue::QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    pub fn notify_failed(msg: impl Into<String>) -> Self {
        Self::NotifyFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Check if this is a permanent failure that should NOT be retried.
    ///
    /// The record is gone, or the media itself can never be rendered.
    pub fn is_permanent_failure(&self) -> bool {
        match self {
            WorkerError::VideoNotFound(_) => true,
            WorkerError::Media(e) => e.is_permanent(),
            WorkerError::Store(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// Check if error is retryable.
    pub fn is_retryable(&self) -> bool {
        !self.is_permanent_failure()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use vedit_media::MediaError;

    #[test]
    fn missing_record_and_bad_media_are_permanent() {
        assert!(WorkerError::VideoNotFound("v1".into()).is_permanent_failure());
        assert!(WorkerError::from(MediaError::FileNotFound(PathBuf::from("x.mp4"))).is_permanent_failure());
        assert!(WorkerError::from(MediaError::InvalidTimeRange {
            start: 10.0,
            duration: 5.0
        })
        .is_permanent_failure());
    }

    #[test]
    fn engine_and_lock_failures_are_retryable() {
        assert!(WorkerError::from(MediaError::Timeout(30)).is_retryable());
        assert!(WorkerError::from(MediaError::ffmpeg_failed("boom", None, Some(1))).is_retryable());
        assert!(WorkerError::LockBusy("v1".into()).is_retryable());
    }
}
