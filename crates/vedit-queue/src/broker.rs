//! Broker interface shared by the Redis and in-process queues.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vedit_models::JobId;

use crate::error::QueueResult;
use crate::job::{JobKind, QueueJob};

/// A job handed to a consumer.
///
/// The delivery stays pending until it is acked, retried or dead-lettered.
/// A consumer that dies holding it leaves it for [`JobBroker::claim_pending`].
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Broker message ID
    pub message_id: String,
    pub job: QueueJob,
    /// Delivery attempt, starting at 1
    pub attempt: u32,
}

/// What happened to a failed delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Scheduled again as `attempt` after `delay`
    Retry { attempt: u32, delay: Duration },
    /// Attempts exhausted, moved to the DLQ
    DeadLettered,
}

/// A job parked in the dead-letter queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub message_id: String,
    pub job: QueueJob,
    /// Last failure reason
    pub error: String,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

/// Durable at-least-once job queue.
///
/// Enqueue is idempotent on [`QueueJob::idempotency_key`]: a second job
/// with a live key fails with [`crate::QueueError::Duplicate`].
#[async_trait]
pub trait JobBroker: Send + Sync {
    /// Prepare streams and consumer groups.
    async fn init(&self) -> QueueResult<()>;

    /// Enqueue a job and return its message ID.
    async fn enqueue(&self, job: QueueJob) -> QueueResult<String>;

    /// Receive up to `count` new jobs of `kind`, waiting at most `block_ms`.
    async fn consume(
        &self,
        kind: JobKind,
        consumer: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<Delivery>>;

    /// Mark a delivery as done.
    async fn ack(&self, delivery: &Delivery) -> QueueResult<()>;

    /// Schedule a failed delivery again with backoff, or dead-letter it once
    /// attempts are exhausted.
    async fn retry_or_dead_letter(
        &self,
        delivery: &Delivery,
        error: &str,
    ) -> QueueResult<FailureDisposition>;

    /// Move a delivery straight to the DLQ.
    async fn dead_letter(&self, delivery: &Delivery, error: &str) -> QueueResult<()>;

    /// Take over deliveries another consumer has held longer than `min_idle`.
    async fn claim_pending(
        &self,
        kind: JobKind,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>>;

    /// Jobs waiting or scheduled for retry.
    /// Job holding `idempotency_key`, if the key is live.
    ///
    /// A render key is live while its job is queued, in flight or waiting
    /// to retry. A notify key stays live after the job finishes.
    async fn key_holder(&self, idempotency_key: &str) -> QueueResult<Option<JobId>>;

    async fn len(&self, kind: JobKind) -> QueueResult<u64>;

    async fn dlq_len(&self, kind: JobKind) -> QueueResult<u64>;

    /// Most recent dead letters first.
    async fn dead_letters(&self, kind: JobKind, limit: usize) -> QueueResult<Vec<DeadLetter>>;

    async fn ping(&self) -> QueueResult<()>;
}
