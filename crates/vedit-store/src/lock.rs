//! Per-video mutual exclusion.
//!
//! The Redis lock is `SET key token NX PX ttl`; release deletes the key only
//! if it still holds our token, so a holder whose lock expired cannot free
//! somebody else's.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use redis::Script;
use tokio::time::Instant;
use tracing::debug;
use vedit_models::VideoId;

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

const RELEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
"#;

/// Proof of holding a video lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    pub video_id: VideoId,
    value: String,
}

impl LockToken {
    fn new(video_id: &VideoId) -> Self {
        Self {
            video_id: video_id.clone(),
            value: format!("holder:{}", uuid::Uuid::new_v4()),
        }
    }
}

#[async_trait]
pub trait VideoLock: Send + Sync {
    /// Try once; `None` if another holder has the video.
    async fn try_acquire(&self, id: &VideoId, ttl: Duration) -> StoreResult<Option<LockToken>>;

    async fn release(&self, token: &LockToken) -> StoreResult<()>;

    /// Poll until the lock is free or `wait` elapses.
    async fn acquire(
        &self,
        id: &VideoId,
        ttl: Duration,
        wait: Duration,
    ) -> StoreResult<Option<LockToken>> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(token) = self.try_acquire(id, ttl).await? {
                return Ok(Some(token));
            }
            if Instant::now() >= deadline {
                debug!(video_id = %id, "Timed out waiting for video lock");
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

/// Redis lock.
pub struct RedisVideoLock {
    client: redis::Client,
    config: StoreConfig,
    release: Script,
}

impl RedisVideoLock {
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self {
            client,
            config,
            release: Script::new(RELEASE_SCRIPT),
        })
    }

    async fn conn(&self) -> StoreResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))
    }
}

#[async_trait]
impl VideoLock for RedisVideoLock {
    async fn try_acquire(&self, id: &VideoId, ttl: Duration) -> StoreResult<Option<LockToken>> {
        let mut conn = self.conn().await?;
        let token = LockToken::new(id);

        // SET key value NX PX ttl
        let result: Option<String> = redis::cmd("SET")
            .arg(self.config.lock_key(id.as_str()))
            .arg(&token.value)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis().max(1) as u64)
            .query_async(&mut conn)
            .await?;

        if result.is_some() {
            debug!(video_id = %id, "Acquired video lock");
            Ok(Some(token))
        } else {
            Ok(None)
        }
    }

    async fn release(&self, token: &LockToken) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let _deleted: i32 = self
            .release
            .key(self.config.lock_key(token.video_id.as_str()))
            .arg(&token.value)
            .invoke_async(&mut conn)
            .await?;
        debug!(video_id = %token.video_id, "Released video lock");
        Ok(())
    }
}

/// Process-local lock with the same expiry semantics.
#[derive(Default)]
pub struct MemoryVideoLock {
    held: Mutex<HashMap<VideoId, (String, Instant)>>,
}

impl MemoryVideoLock {
    pub fn new() -> Self {
        Self::default()
    }

    fn held(&self) -> StoreResult<std::sync::MutexGuard<'_, HashMap<VideoId, (String, Instant)>>> {
        self.held
            .lock()
            .map_err(|_| StoreError::ConnectionFailed("lock table poisoned".to_string()))
    }
}

#[async_trait]
impl VideoLock for MemoryVideoLock {
    async fn try_acquire(&self, id: &VideoId, ttl: Duration) -> StoreResult<Option<LockToken>> {
        let mut held = self.held()?;
        let now = Instant::now();
        if let Some((_, expires_at)) = held.get(id) {
            if *expires_at > now {
                return Ok(None);
            }
        }
        let token = LockToken::new(id);
        held.insert(id.clone(), (token.value.clone(), now + ttl));
        Ok(Some(token))
    }

    async fn release(&self, token: &LockToken) -> StoreResult<()> {
        let mut held = self.held()?;
        if held
            .get(&token.video_id)
            .is_some_and(|(value, _)| *value == token.value)
        {
            held.remove(&token.video_id);
        }
        Ok(())
    }
}
