//! On-disk layout of uploads and generated artifacts.

use std::path::{Path, PathBuf};

use chrono::Utc;
use uuid::Uuid;
use vedit_models::EditOperation;

use crate::error::MediaResult;

/// Default directory for uploads and intermediate edits.
pub const DEFAULT_UPLOADS_DIR: &str = "uploads";
/// Default directory for rendered deliverables.
pub const DEFAULT_RENDERED_DIR: &str = "rendered";

/// Where uploads, edits and renders live.
///
/// Uploads and intermediate edits share `uploads_dir`; final renders go to
/// `rendered_dir`. Every generated name carries a millisecond timestamp and
/// a random suffix, so two artifacts never collide even when produced in
/// the same millisecond.
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    uploads_dir: PathBuf,
    rendered_dir: PathBuf,
}

impl Default for ArtifactLayout {
    fn default() -> Self {
        Self::new(DEFAULT_UPLOADS_DIR, DEFAULT_RENDERED_DIR)
    }
}

impl ArtifactLayout {
    pub fn new(uploads_dir: impl Into<PathBuf>, rendered_dir: impl Into<PathBuf>) -> Self {
        Self {
            uploads_dir: uploads_dir.into(),
            rendered_dir: rendered_dir.into(),
        }
    }

    /// Create from `UPLOADS_DIR` / `RENDERED_DIR`.
    pub fn from_env() -> Self {
        Self::new(
            std::env::var("UPLOADS_DIR").unwrap_or_else(|_| DEFAULT_UPLOADS_DIR.to_string()),
            std::env::var("RENDERED_DIR").unwrap_or_else(|_| DEFAULT_RENDERED_DIR.to_string()),
        )
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.uploads_dir
    }

    pub fn rendered_dir(&self) -> &Path {
        &self.rendered_dir
    }

    /// Create both directories if missing.
    pub async fn ensure_dirs(&self) -> MediaResult<()> {
        tokio::fs::create_dir_all(&self.uploads_dir).await?;
        tokio::fs::create_dir_all(&self.rendered_dir).await?;
        Ok(())
    }

    /// Destination for an uploaded file, derived from the client file name.
    pub fn upload_path(&self, original_name: &str) -> PathBuf {
        let name = sanitize_file_name(original_name);
        self.uploads_dir
            .join(format!("{}-{}-{}", Utc::now().timestamp_millis(), short_id(), name))
    }

    /// Fresh output path for the artifact `operation` produces.
    pub fn artifact_path(&self, operation: &EditOperation) -> PathBuf {
        let dir = match operation {
            EditOperation::FinalRender => &self.rendered_dir,
            _ => &self.uploads_dir,
        };
        dir.join(format!(
            "{}_{}_{}.mp4",
            operation.artifact_prefix(),
            Utc::now().timestamp_millis(),
            short_id()
        ))
    }
}

fn short_id() -> String {
    let id = Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}

/// Keep the last path component and replace anything unusual with `_`.
fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(&['/', '\\'][..]).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload.mp4".to_string()
    } else {
        cleaned.to_string()
    }
}
