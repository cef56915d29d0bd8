//! Repository interface for video records.

use async_trait::async_trait;
use vedit_models::{VideoId, VideoRecord};

use crate::error::StoreResult;
use crate::patch::VideoPatch;

/// Storage for video records.
///
/// `update` is an atomic read-modify-write: the patch's preconditions are
/// checked against the stored record and the result is written only if no
/// other writer got in between.
#[async_trait]
pub trait VideoRepository: Send + Sync {
    /// Get a video by ID.
    async fn get(&self, id: &VideoId) -> StoreResult<Option<VideoRecord>>;

    /// Create a new video record. Fails with `AlreadyExists` on an ID clash.
    async fn create(&self, record: &VideoRecord) -> StoreResult<()>;

    /// Apply `patch` and return the stored result.
    async fn update(&self, id: &VideoId, patch: &VideoPatch) -> StoreResult<VideoRecord>;

    async fn ping(&self) -> StoreResult<()>;
}
