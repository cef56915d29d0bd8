//! Operator views of the job queues.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use vedit_queue::{DeadLetter, JobKind};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
pub struct DeadLetterQuery {
    pub limit: Option<usize>,
}

/// Queue depths plus the most recent dead letters of one kind.
#[derive(Serialize)]
pub struct DeadLetterResponse {
    pub kind: JobKind,
    pub queue_length: u64,
    pub dlq_length: u64,
    pub entries: Vec<DeadLetter>,
}

/// List dead-lettered jobs of `kind`, newest first.
pub async fn list_dead_letters(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(query): Query<DeadLetterQuery>,
) -> ApiResult<Json<DeadLetterResponse>> {
    let kind = JobKind::parse(&kind).ok_or_else(|| {
        ApiError::not_found(format!("Unknown job kind '{kind}' (expected render or notify)"))
    })?;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let queue_length = state.queue.len(kind).await?;
    let dlq_length = state.queue.dlq_len(kind).await?;
    let entries = state.queue.dead_letters(kind, limit).await?;

    Ok(Json(DeadLetterResponse {
        kind,
        queue_length,
        dlq_length,
        entries,
    }))
}
