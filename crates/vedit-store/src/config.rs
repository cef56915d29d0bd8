//! Store configuration.

use std::time::Duration;

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Redis URL
    pub redis_url: String,
    /// Prefix for record and lock keys
    pub key_prefix: String,
    /// Lock expiry, bounds how long a crashed holder blocks a video
    pub lock_ttl: Duration,
    /// How long a caller waits for a busy video before giving up
    pub lock_wait: Duration,
    /// WATCH/EXEC rounds before an update reports a conflict
    pub max_update_retries: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "vedit".to_string(),
            lock_ttl: Duration::from_secs(35 * 60), // outlives the 30 minute transcode timeout
            lock_wait: Duration::from_secs(30),
            max_update_retries: 5,
        }
    }
}

impl StoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            key_prefix: std::env::var("STORE_KEY_PREFIX").unwrap_or(defaults.key_prefix),
            lock_ttl: std::env::var("LOCK_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.lock_ttl),
            lock_wait: std::env::var("LOCK_WAIT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.lock_wait),
            max_update_retries: defaults.max_update_retries,
        }
    }

    pub fn video_key(&self, id: &str) -> String {
        format!("{}:video:{}", self.key_prefix, id)
    }

    pub fn lock_key(&self, id: &str) -> String {
        format!("{}:lock:video:{}", self.key_prefix, id)
    }
}
