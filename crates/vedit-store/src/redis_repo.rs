//! Redis-backed video repository.
//!
//! Each record is one JSON string at `{prefix}:video:{id}`. Updates use
//! optimistic locking: WATCH the key, read, apply the patch, then write in
//! MULTI/EXEC. An aborted EXEC means another writer won; the update is
//! retried against the fresh value.

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::{debug, info, warn};
use vedit_models::{VideoId, VideoRecord};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::patch::VideoPatch;
use crate::repo::VideoRepository;

/// Repository for video records in Redis.
pub struct RedisVideoRepository {
    client: redis::Client,
    config: StoreConfig,
}

impl RedisVideoRepository {
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> StoreResult<Self> {
        Self::new(StoreConfig::from_env())
    }

    /// A fresh connection per call; WATCH state must not be shared.
    async fn conn(&self) -> StoreResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))
    }
}

#[async_trait]
impl VideoRepository for RedisVideoRepository {
    async fn get(&self, id: &VideoId) -> StoreResult<Option<VideoRecord>> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn.get(self.config.video_key(id.as_str())).await?;
        raw.map(|s| serde_json::from_str(&s).map_err(StoreError::from))
            .transpose()
    }

    async fn create(&self, record: &VideoRecord) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(record)?;

        let created: Option<String> = redis::cmd("SET")
            .arg(self.config.video_key(record.id.as_str()))
            .arg(payload)
            .arg("NX")
            .query_async(&mut conn)
            .await?;
        if created.is_none() {
            return Err(StoreError::AlreadyExists(record.id.to_string()));
        }

        info!(video_id = %record.id, "Created video record");
        Ok(())
    }

    async fn update(&self, id: &VideoId, patch: &VideoPatch) -> StoreResult<VideoRecord> {
        let key = self.config.video_key(id.as_str());
        let mut conn = self.conn().await?;

        for attempt in 0..self.config.max_update_retries {
            redis::cmd("WATCH")
                .arg(&key)
                .query_async::<()>(&mut conn)
                .await?;

            let raw: Option<String> = conn.get(&key).await?;
            let Some(raw) = raw else {
                redis::cmd("UNWATCH").query_async::<()>(&mut conn).await?;
                return Err(StoreError::not_found(id.as_str()));
            };

            let current: VideoRecord = serde_json::from_str(&raw)?;
            let next = match patch.apply(&current) {
                Ok(next) => next,
                Err(e) => {
                    redis::cmd("UNWATCH").query_async::<()>(&mut conn).await?;
                    return Err(e);
                }
            };
            let payload = serde_json::to_string(&next)?;

            let committed: Option<(String,)> = redis::pipe()
                .atomic()
                .set(&key, payload)
                .query_async(&mut conn)
                .await?;

            if committed.is_some() {
                debug!(video_id = %id, version = next.version, "Updated video record");
                return Ok(next);
            }

            metrics::counter!("vedit_store_update_conflicts_total").increment(1);
            warn!(
                video_id = %id,
                attempt = attempt + 1,
                "Video update lost a race, retrying"
            );
        }

        Err(StoreError::Conflict(format!(
            "video {} changed concurrently {} times",
            id, self.config.max_update_retries
        )))
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}
