//! Queue configuration.

use std::time::Duration;

use crate::job::JobKind;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Prefix for every key the queue owns
    pub key_prefix: String,
    /// Deliveries allowed before a job is dead-lettered
    pub max_attempts: u32,
    /// Delay before the first retry
    pub backoff_base: Duration,
    /// Upper bound on the retry delay
    pub backoff_max: Duration,
    /// Lifetime of idempotency keys
    pub dedup_ttl: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "vedit".to_string(),
            max_attempts: 3,
            backoff_base: Duration::from_secs(2),
            backoff_max: Duration::from_secs(60),
            dedup_ttl: Duration::from_secs(86400), // 24 hours
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            key_prefix: std::env::var("QUEUE_KEY_PREFIX").unwrap_or(defaults.key_prefix),
            max_attempts: env_parse("QUEUE_MAX_ATTEMPTS")
                .filter(|n: &u32| *n > 0)
                .unwrap_or(defaults.max_attempts),
            backoff_base: env_parse("QUEUE_BACKOFF_BASE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.backoff_base),
            backoff_max: env_parse("QUEUE_BACKOFF_MAX_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.backoff_max),
            dedup_ttl: env_parse("QUEUE_DEDUP_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.dedup_ttl),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_max = max;
        self
    }

    pub fn with_dedup_ttl(mut self, ttl: Duration) -> Self {
        self.dedup_ttl = ttl;
        self
    }

    /// Exponential backoff: `base * 2^(attempt-1)`, capped at `backoff_max`.
    ///
    /// `attempt` is the delivery that just failed, starting at 1.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let delay = self.backoff_base.saturating_mul(1u32 << exponent);
        delay.min(self.backoff_max)
    }

    pub fn stream_key(&self, kind: JobKind) -> String {
        format!("{}:jobs:{}", self.key_prefix, kind)
    }

    pub fn dlq_key(&self, kind: JobKind) -> String {
        format!("{}:dlq:{}", self.key_prefix, kind)
    }

    pub fn delayed_key(&self, kind: JobKind) -> String {
        format!("{}:delayed:{}", self.key_prefix, kind)
    }

    pub fn consumer_group(&self, kind: JobKind) -> String {
        format!("{}:workers:{}", self.key_prefix, kind)
    }

    pub fn dedup_key(&self, idempotency_key: &str) -> String {
        format!("{}:dedup:{}", self.key_prefix, idempotency_key)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}
