//! In-memory video repository.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use vedit_models::{VideoId, VideoRecord};

use crate::error::{StoreError, StoreResult};
use crate::patch::VideoPatch;
use crate::repo::VideoRepository;

/// Records kept in a process-local map.
#[derive(Default)]
pub struct MemoryVideoRepository {
    records: Mutex<HashMap<VideoId, VideoRecord>>,
}

impl MemoryVideoRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> StoreResult<std::sync::MutexGuard<'_, HashMap<VideoId, VideoRecord>>> {
        self.records
            .lock()
            .map_err(|_| StoreError::ConnectionFailed("record map lock poisoned".to_string()))
    }
}

#[async_trait]
impl VideoRepository for MemoryVideoRepository {
    async fn get(&self, id: &VideoId) -> StoreResult<Option<VideoRecord>> {
        Ok(self.records()?.get(id).cloned())
    }

    async fn create(&self, record: &VideoRecord) -> StoreResult<()> {
        let mut records = self.records()?;
        if records.contains_key(&record.id) {
            return Err(StoreError::AlreadyExists(record.id.to_string()));
        }
        records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn update(&self, id: &VideoId, patch: &VideoPatch) -> StoreResult<VideoRecord> {
        let mut records = self.records()?;
        let current = records
            .get(id)
            .ok_or_else(|| StoreError::not_found(id.as_str()))?;
        let next = patch.apply(current)?;
        records.insert(id.clone(), next.clone());
        Ok(next)
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
