//! Liveness and readiness probes.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::future::Future;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use crate::state::AppState;

/// Liveness: the process is up and serving.
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Outcome of pinging one dependency.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum DependencyCheck {
    Ok { latency_ms: u64 },
    Error { error: String },
}

impl DependencyCheck {
    async fn run<E: Display>(ping: impl Future<Output = Result<(), E>>) -> Self {
        let started = Instant::now();
        match ping.await {
            Ok(()) => Self::Ok {
                latency_ms: started.elapsed().as_millis() as u64,
            },
            Err(e) => Self::Error {
                error: e.to_string(),
            },
        }
    }

    fn passed(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }
}

/// Readiness: the record store and the job queue both answer a ping.
///
/// Responds 503 with the same body when either is unreachable.
pub async fn ready(State(state): State<AppState>) -> Response {
    let (store, queue) = tokio::join!(
        DependencyCheck::run(state.store.ping()),
        DependencyCheck::run(state.queue.ping()),
    );
    let checks = BTreeMap::from([("store", store), ("queue", queue)]);

    let (code, status) = if checks.values().all(DependencyCheck::passed) {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (code, Json(json!({ "status": status, "checks": checks }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failed_ping_carries_the_error() {
        let check = DependencyCheck::run(async { Err::<(), _>("connection refused") }).await;
        assert!(!check.passed());
        assert_eq!(
            serde_json::to_value(&check).unwrap(),
            json!({"status": "error", "error": "connection refused"})
        );
    }

    #[tokio::test]
    async fn passing_ping_reports_latency() {
        let check = DependencyCheck::run(async { Ok::<(), String>(()) }).await;
        assert!(check.passed());
        assert_eq!(serde_json::to_value(&check).unwrap()["status"], "ok");
    }
}
