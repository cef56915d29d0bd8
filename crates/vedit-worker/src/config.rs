//! Worker configuration.

use std::time::Duration;

use vedit_queue::JobKind;

use crate::error::{WorkerError, WorkerResult};

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Concurrent render jobs
    pub render_concurrency: usize,
    /// Concurrent notification jobs
    pub notify_concurrency: usize,
    /// How long one consume call parks waiting for work
    pub block_ms: u64,
    /// Upper bound on jobs taken per consume call
    pub batch_size: usize,
    /// How often the worker should scan for orphaned pending jobs
    pub claim_interval: Duration,
    /// Minimum idle time before a pending job can be claimed (crash recovery).
    ///
    /// Must exceed the render lock's wait plus TTL, see [`WorkerConfig::check_claim_window`].
    pub claim_min_idle: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Webhook for render notifications; logs only when unset
    pub webhook_url: Option<String>,
    /// Port for the Prometheus listener, when metrics are enabled
    pub metrics_port: Option<u16>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            render_concurrency: 2,
            notify_concurrency: 4,
            block_ms: 1000,
            batch_size: 5,
            claim_interval: Duration::from_secs(30),
            // Past the default render lock TTL (35m) plus lock wait (30s)
            claim_min_idle: Duration::from_secs(2200),
            shutdown_timeout: Duration::from_secs(60),
            webhook_url: None,
            metrics_port: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let metrics_enabled = std::env::var("METRICS_ENABLED")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self {
            render_concurrency: env_parse("WORKER_RENDER_CONCURRENCY")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.render_concurrency),
            notify_concurrency: env_parse("WORKER_NOTIFY_CONCURRENCY")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.notify_concurrency),
            block_ms: env_parse("WORKER_BLOCK_MS").unwrap_or(defaults.block_ms),
            batch_size: defaults.batch_size,
            claim_interval: env_parse("WORKER_CLAIM_INTERVAL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.claim_interval),
            claim_min_idle: env_parse("QUEUE_CLAIM_MIN_IDLE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.claim_min_idle),
            shutdown_timeout: env_parse("WORKER_SHUTDOWN_TIMEOUT")
                .map(Duration::from_secs)
                .unwrap_or(defaults.shutdown_timeout),
            webhook_url: std::env::var("NOTIFY_WEBHOOK_URL")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            metrics_port: metrics_enabled
                .then(|| env_parse("METRICS_PORT").unwrap_or(9090)),
        }
    }

    /// Reject a claim window that could hand a delivery to a second worker
    /// while the first may still hold, or wait for, the render lock.
    ///
    /// `lock_window` is the render lock's wait plus its TTL.
    pub fn check_claim_window(&self, lock_window: Duration) -> WorkerResult<()> {
        if self.claim_min_idle <= lock_window {
            return Err(WorkerError::config_error(format!(
                "claim_min_idle ({:?}) must exceed render lock wait + TTL ({:?})",
                self.claim_min_idle, lock_window
            )));
        }
        Ok(())
    }

    pub fn concurrency_for(&self, kind: JobKind) -> usize {
        match kind {
            JobKind::Render => self.render_concurrency,
            JobKind::Notify => self.notify_concurrency,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_claim_window_outlasts_default_render_lock() {
        let lock_window = Duration::from_secs(35 * 60) + Duration::from_secs(30);
        assert!(WorkerConfig::default().check_claim_window(lock_window).is_ok());
    }

    #[test]
    fn claim_window_inside_lock_ttl_is_rejected() {
        let config = WorkerConfig {
            claim_min_idle: Duration::from_secs(1900),
            ..Default::default()
        };
        let err = config
            .check_claim_window(Duration::from_secs(35 * 60 + 30))
            .unwrap_err();
        assert!(matches!(err, WorkerError::ConfigError(_)));

        let equal = WorkerConfig {
            claim_min_idle: Duration::from_secs(2130),
            ..Default::default()
        };
        assert!(equal.check_claim_window(Duration::from_secs(2130)).is_err());
    }
}
