//! Video record models.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::JobId;

/// Unique identifier for an uploaded video.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct VideoId(pub String);

impl VideoId {
    /// Generate a new random video ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for VideoId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for VideoId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VideoId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle status of a video.
///
/// `Uploaded` is the initial state and stays in place across synchronous
/// edits. `Processing` is entered when a render job is accepted and left
/// either for `Rendered` (success) or for the status observed before the
/// render (terminal failure).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    #[default]
    Uploaded,
    Processing,
    Rendered,
}

impl VideoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoStatus::Uploaded => "uploaded",
            VideoStatus::Processing => "processing",
            VideoStatus::Rendered => "rendered",
        }
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file accepted by the upload endpoint and already written to disk.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UploadedFile {
    /// Stored file name
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// Location of the stored file
    pub path: String,
}

/// Persisted state of one uploaded video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoRecord {
    /// Video ID
    pub id: VideoId,
    /// Uploaded file name
    pub name: String,
    /// Uploaded size in bytes
    pub size: u64,
    /// Media duration in seconds, when it could be probed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    /// Immutable uploaded source
    pub original_path: String,
    /// Most recent intermediate artifact
    #[serde(default)]
    pub edited_path: Option<String>,
    /// Rendered deliverable
    #[serde(default)]
    pub final_path: Option<String>,
    /// Lifecycle status
    #[serde(default)]
    pub status: VideoStatus,
    /// Render job that owns (or last completed) the render stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render_job_id: Option<JobId>,
    /// Status observed when the current render was accepted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_before_render: Option<VideoStatus>,
    /// Revision counter, bumped on every update
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VideoRecord {
    /// Create a record for a freshly uploaded file.
    pub fn new(file: &UploadedFile) -> Self {
        let now = Utc::now();
        Self {
            id: VideoId::new(),
            name: file.name.clone(),
            size: file.size,
            duration: None,
            original_path: file.path.clone(),
            edited_path: None,
            final_path: None,
            status: VideoStatus::Uploaded,
            render_job_id: None,
            status_before_render: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the probed duration.
    pub fn with_duration(mut self, duration: Option<f64>) -> Self {
        self.duration = duration;
        self
    }

    /// Input for the next edit or render: the latest edit, else the upload.
    pub fn working_path(&self) -> &str {
        self.edited_path.as_deref().unwrap_or(&self.original_path)
    }

    /// True while a render job owns the record.
    pub fn is_rendering(&self) -> bool {
        self.status == VideoStatus::Processing
    }

    /// Final deliverable, if the record has been rendered.
    pub fn rendered_path(&self) -> Option<&str> {
        match self.status {
            VideoStatus::Rendered => self.final_path.as_deref(),
            _ => None,
        }
    }

    /// True if `job_id` is the render job that currently owns this record.
    pub fn is_owned_by(&self, job_id: &JobId) -> bool {
        self.render_job_id.as_ref() == Some(job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload() -> UploadedFile {
        UploadedFile {
            name: "clip.mp4".to_string(),
            size: 1_000_000,
            path: "uploads/clip.mp4".to_string(),
        }
    }

    #[test]
    fn new_record_starts_uploaded() {
        let record = VideoRecord::new(&upload());
        assert_eq!(record.status, VideoStatus::Uploaded);
        assert_eq!(record.original_path, "uploads/clip.mp4");
        assert!(record.edited_path.is_none());
        assert!(record.final_path.is_none());
        assert_eq!(record.version, 1);
    }

    #[test]
    fn working_path_prefers_edit() {
        let mut record = VideoRecord::new(&upload());
        assert_eq!(record.working_path(), "uploads/clip.mp4");

        record.edited_path = Some("uploads/trimmed_1.mp4".to_string());
        assert_eq!(record.working_path(), "uploads/trimmed_1.mp4");
    }

    #[test]
    fn rendered_path_requires_rendered_status() {
        let mut record = VideoRecord::new(&upload());
        record.final_path = Some("rendered/final_1.mp4".to_string());
        assert!(record.rendered_path().is_none());

        record.status = VideoStatus::Rendered;
        assert_eq!(record.rendered_path(), Some("rendered/final_1.mp4"));
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&VideoStatus::Processing).unwrap(),
            "\"processing\""
        );
    }

    #[test]
    fn record_tolerates_missing_optional_fields() {
        let json = r#"{
            "id": "abc",
            "name": "clip.mp4",
            "size": 10,
            "original_path": "uploads/clip.mp4",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        }"#;
        let record: VideoRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.status, VideoStatus::Uploaded);
        assert!(record.render_job_id.is_none());
    }
}
