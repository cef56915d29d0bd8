//! FFmpeg CLI wrapper for edit and render operations.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - Progress parsing from `-progress pipe:2`
//! - Timeout-bounded execution with stderr diagnostics
//! - The [`MediaExecutor`] seam used by the API and the workers
//! - Artifact path layout for uploads, edits and renders

pub mod command;
pub mod config;
pub mod error;
pub mod executor;
pub mod filters;
pub mod fs_utils;
pub mod layout;
pub mod probe;
pub mod progress;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use config::MediaConfig;
pub use error::{MediaError, MediaResult};
pub use executor::{FfmpegExecutor, MediaExecutor};
pub use filters::{build_drawtext_filter, escape_drawtext, DrawTextOptions};
pub use layout::ArtifactLayout;
pub use probe::{probe_video, VideoInfo};
pub use progress::FfmpegProgress;
