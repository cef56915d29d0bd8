//! Media errors.

use std::path::PathBuf;
use thiserror::Error;

pub type MediaResult<T> = Result<T, MediaError>;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("{0} not found in PATH")]
    MissingBinary(&'static str),

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        /// Last lines of ffmpeg's log
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Invalid time range: start {start:.3}s is not before media end {duration:.3}s")]
    InvalidTimeRange { start: f64, duration: f64 },

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("Transcode timed out after {0} seconds")]
    Timeout(u64),

    #[error("Unreadable ffprobe output: {0}")]
    ProbeOutput(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Tool output captured alongside the failure.
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            Self::FfmpegFailed { stderr, .. } | Self::FfprobeFailed { stderr, .. } => stderr.as_deref(),
            _ => None,
        }
    }

    /// The input itself is unusable; running the operation again cannot help.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::FileNotFound(_) | Self::InvalidTimeRange { .. } | Self::InvalidVideo(_)
        )
    }
}
