//! Shared data models for the vedit pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Video records and their lifecycle status
//! - Edit operations (trim, text overlay, final render)
//! - Encoding configuration
//! - Timestamp parsing for request payloads

pub mod edit;
pub mod encoding;
pub mod job;
pub mod timestamp;
pub mod video;

// Re-export common types
pub use edit::{EditError, EditOperation, TimeWindow};
pub use encoding::EncodingConfig;
pub use job::JobId;
pub use timestamp::{parse_timestamp, TimestampError};
pub use video::{UploadedFile, VideoId, VideoRecord, VideoStatus};
