//! Worker metrics.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use vedit_queue::JobKind;

use crate::error::{WorkerError, WorkerResult};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_COMPLETED_TOTAL: &str = "vedit_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "vedit_jobs_failed_total";
    pub const JOBS_DEAD_LETTERED_TOTAL: &str = "vedit_jobs_dead_lettered_total";
    pub const JOB_DURATION_SECONDS: &str = "vedit_job_duration_seconds";
    pub const NOTIFICATIONS_SENT_TOTAL: &str = "vedit_notifications_sent_total";
}

/// Serve Prometheus metrics on `0.0.0.0:port`.
pub fn init_metrics(port: u16) -> WorkerResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
        .install()
        .map_err(|e| WorkerError::config_error(format!("metrics exporter: {e}")))
}

pub fn record_job_completed(kind: JobKind, duration_secs: f64) {
    counter!(names::JOBS_COMPLETED_TOTAL, "kind" => kind.as_str()).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "kind" => kind.as_str()).record(duration_secs);
}

pub fn record_job_failed(kind: JobKind, permanent: bool) {
    counter!(
        names::JOBS_FAILED_TOTAL,
        "kind" => kind.as_str(),
        "permanent" => if permanent { "true" } else { "false" }
    )
    .increment(1);
}

pub fn record_job_dead_lettered(kind: JobKind) {
    counter!(names::JOBS_DEAD_LETTERED_TOTAL, "kind" => kind.as_str()).increment(1);
}

pub fn record_notification_sent(sink: &'static str) {
    counter!(names::NOTIFICATIONS_SENT_TOTAL, "sink" => sink).increment(1);
}
