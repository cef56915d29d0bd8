//! Job queue using Redis Streams.
//!
//! Layout per job kind:
//! - `{prefix}:jobs:{kind}`: stream read by the `{prefix}:workers:{kind}` group
//! - `{prefix}:delayed:{kind}`: ZSET of retries scored by due time in ms
//! - `{prefix}:dlq:{kind}`: dead-letter stream
//!
//! Idempotency keys live at `{prefix}:dedup:{key}`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::streams::{
    StreamClaimReply, StreamId, StreamPendingCountReply, StreamRangeReply, StreamReadReply,
};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use vedit_models::JobId;

use crate::broker::{DeadLetter, Delivery, FailureDisposition, JobBroker};
use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use crate::job::{JobKind, QueueJob};

/// Moves due retries from the delayed ZSET back onto the stream.
const PROMOTE_DUE_SCRIPT: &str = r#"
local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, tonumber(ARGV[2]))
for _, member in ipairs(due) do
  local entry = cjson.decode(member)
  redis.call('XADD', KEYS[2], '*', 'job', entry.job, 'key', entry.key, 'attempt', tostring(entry.attempt))
  redis.call('ZREM', KEYS[1], member)
end
return #due
"#;

/// Retry waiting in the delayed ZSET.
#[derive(Debug, Serialize, Deserialize)]
struct DelayedEntry {
    job: String,
    key: String,
    attempt: u32,
    /// Message ID of the failed delivery; keeps members unique
    origin: String,
}

/// Job queue client.
pub struct JobQueue {
    client: redis::Client,
    config: QueueConfig,
    promote: redis::Script,
}

impl JobQueue {
    /// Create a new job queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self {
            client,
            config,
            promote: redis::Script::new(PROMOTE_DUE_SCRIPT),
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    async fn conn(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))
    }

    async fn promote_due(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        kind: JobKind,
        limit: usize,
    ) -> QueueResult<()> {
        let promoted: u64 = self
            .promote
            .key(self.config.delayed_key(kind))
            .key(self.config.stream_key(kind))
            .arg(Utc::now().timestamp_millis())
            .arg(limit.max(1))
            .invoke_async(conn)
            .await?;
        if promoted > 0 {
            debug!(kind = %kind, promoted, "Promoted due retries");
        }
        Ok(())
    }

    /// XACK + XDEL one message by ID, optionally releasing a dedup key.
    async fn ack_raw(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        kind: JobKind,
        message_id: &str,
        release_key: Option<&str>,
    ) -> QueueResult<()> {
        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("XACK")
            .arg(self.config.stream_key(kind))
            .arg(self.config.consumer_group(kind))
            .arg(message_id)
            .ignore()
            .cmd("XDEL")
            .arg(self.config.stream_key(kind))
            .arg(message_id)
            .ignore();
        if let Some(key) = release_key {
            pipe.del(self.config.dedup_key(key)).ignore();
        }
        pipe.query_async::<()>(conn).await?;
        Ok(())
    }

    /// Decode stream entries, acking anything that is not a valid job.
    async fn decode_entries(
        &self,
        conn: &mut redis::aio::MultiplexedConnection,
        kind: JobKind,
        entries: Vec<StreamId>,
        extra_deliveries: impl Fn(&str) -> u32,
    ) -> Vec<Delivery> {
        let mut deliveries = Vec::with_capacity(entries.len());
        for entry in entries {
            match parse_entry(&entry) {
                Ok((job, attempt)) => {
                    let attempt = attempt + extra_deliveries(&entry.id);
                    debug!(kind = %kind, job_id = %job.job_id(), attempt, "Consumed job from stream");
                    deliveries.push(Delivery {
                        message_id: entry.id,
                        job,
                        attempt,
                    });
                }
                Err(e) => {
                    warn!(kind = %kind, message_id = %entry.id, "Dropping malformed job: {}", e);
                    // Ack the malformed message to prevent reprocessing
                    self.ack_raw(conn, kind, &entry.id, None).await.ok();
                }
            }
        }
        deliveries
    }
}

#[async_trait]
impl JobBroker for JobQueue {
    /// Create consumer groups if they do not exist.
    async fn init(&self) -> QueueResult<()> {
        let mut conn = self.conn().await?;

        for kind in JobKind::ALL {
            let group = self.config.consumer_group(kind);
            // Start at 0 so jobs enqueued before the first worker are not skipped
            let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
                .arg("CREATE")
                .arg(self.config.stream_key(kind))
                .arg(&group)
                .arg("0")
                .arg("MKSTREAM")
                .query_async(&mut conn)
                .await;

            match result {
                Ok(_) => info!("Created consumer group: {}", group),
                Err(e) if e.to_string().contains("BUSYGROUP") => {
                    debug!("Consumer group already exists: {}", group);
                }
                Err(e) => return Err(QueueError::Redis(e)),
            }
        }

        Ok(())
    }

    async fn enqueue(&self, job: QueueJob) -> QueueResult<String> {
        let mut conn = self.conn().await?;

        let payload = serde_json::to_string(&job)?;
        let idempotency_key = job.idempotency_key();
        let dedup_key = self.config.dedup_key(&idempotency_key);

        // Claim the idempotency key first; SET NX makes the check atomic
        let claimed: Option<String> = redis::cmd("SET")
            .arg(&dedup_key)
            .arg(job.job_id().as_str())
            .arg("NX")
            .arg("EX")
            .arg(self.config.dedup_ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        if claimed.is_none() {
            warn!("Duplicate job rejected: {}", idempotency_key);
            return Err(QueueError::duplicate(idempotency_key));
        }

        let kind = job.kind();
        let added: Result<String, redis::RedisError> = redis::cmd("XADD")
            .arg(self.config.stream_key(kind))
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("key")
            .arg(&idempotency_key)
            .arg("attempt")
            .arg(1)
            .query_async(&mut conn)
            .await;

        let message_id = match added {
            Ok(id) => id,
            Err(e) => {
                conn.del::<_, ()>(&dedup_key).await.ok();
                return Err(QueueError::enqueue_failed(e.to_string()));
            }
        };

        info!(
            kind = %kind,
            "Enqueued job {} with message ID {}",
            job.job_id(),
            message_id
        );

        Ok(message_id)
    }

    async fn consume(
        &self,
        kind: JobKind,
        consumer: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.conn().await?;
        self.promote_due(&mut conn, kind, count).await?;

        let reply: Option<StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(self.config.consumer_group(kind))
            .arg(consumer)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(self.config.stream_key(kind))
            .arg(">") // Only new messages
            .query_async(&mut conn)
            .await?;

        let entries: Vec<StreamId> = reply
            .map(|r| r.keys.into_iter().flat_map(|k| k.ids).collect())
            .unwrap_or_default();

        Ok(self.decode_entries(&mut conn, kind, entries, |_| 0).await)
    }

    async fn ack(&self, delivery: &Delivery) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let release = delivery
            .job
            .releases_key_on_finish()
            .then(|| delivery.job.idempotency_key());
        self.ack_raw(&mut conn, delivery.job.kind(), &delivery.message_id, release.as_deref())
            .await?;
        debug!("Acknowledged job: {}", delivery.message_id);
        Ok(())
    }

    async fn retry_or_dead_letter(
        &self,
        delivery: &Delivery,
        error: &str,
    ) -> QueueResult<FailureDisposition> {
        if delivery.attempt >= self.config.max_attempts {
            self.dead_letter(delivery, error).await?;
            return Ok(FailureDisposition::DeadLettered);
        }

        let mut conn = self.conn().await?;
        let kind = delivery.job.kind();
        let delay = self.config.backoff_for(delivery.attempt);
        let next_attempt = delivery.attempt + 1;
        let member = serde_json::to_string(&DelayedEntry {
            job: serde_json::to_string(&delivery.job)?,
            key: delivery.job.idempotency_key(),
            attempt: next_attempt,
            origin: delivery.message_id.clone(),
        })?;
        let due_ms = Utc::now().timestamp_millis() + delay.as_millis() as i64;

        redis::pipe()
            .atomic()
            .zadd(self.config.delayed_key(kind), member, due_ms)
            .ignore()
            .cmd("XACK")
            .arg(self.config.stream_key(kind))
            .arg(self.config.consumer_group(kind))
            .arg(&delivery.message_id)
            .ignore()
            .cmd("XDEL")
            .arg(self.config.stream_key(kind))
            .arg(&delivery.message_id)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;

        info!(
            kind = %kind,
            job_id = %delivery.job.job_id(),
            attempt = next_attempt,
            delay_ms = delay.as_millis() as u64,
            "Scheduled job retry: {}",
            error
        );

        Ok(FailureDisposition::Retry {
            attempt: next_attempt,
            delay,
        })
    }

    async fn dead_letter(&self, delivery: &Delivery, error: &str) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let kind = delivery.job.kind();
        let payload = serde_json::to_string(&delivery.job)?;

        redis::cmd("XADD")
            .arg(self.config.dlq_key(kind))
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(&delivery.message_id)
            .arg("attempts")
            .arg(delivery.attempt)
            .arg("failed_at")
            .arg(Utc::now().to_rfc3339())
            .query_async::<()>(&mut conn)
            .await?;

        let release = delivery
            .job
            .releases_key_on_finish()
            .then(|| delivery.job.idempotency_key());
        self.ack_raw(&mut conn, kind, &delivery.message_id, release.as_deref())
            .await?;

        warn!("Moved job {} to DLQ: {}", delivery.job.job_id(), error);
        Ok(())
    }

    /// Claim pending jobs that have been idle for too long.
    /// This handles jobs from crashed workers.
    async fn claim_pending(
        &self,
        kind: JobKind,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.conn().await?;
        let min_idle_ms = min_idle.as_millis() as u64;

        let pending: StreamPendingCountReply = redis::cmd("XPENDING")
            .arg(self.config.stream_key(kind))
            .arg(self.config.consumer_group(kind))
            .arg("IDLE")
            .arg(min_idle_ms)
            .arg("-")
            .arg("+")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        if pending.ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut cmd = redis::cmd("XCLAIM");
        cmd.arg(self.config.stream_key(kind))
            .arg(self.config.consumer_group(kind))
            .arg(consumer)
            .arg(min_idle_ms);
        for p in &pending.ids {
            cmd.arg(&p.id);
        }
        let claimed: StreamClaimReply = cmd.query_async(&mut conn).await?;

        // Every earlier delivery of an entry counts as a spent attempt
        let deliveries = self
            .decode_entries(&mut conn, kind, claimed.ids, |id| {
                pending
                    .ids
                    .iter()
                    .find(|p| p.id == id)
                    .map(|p| p.times_delivered as u32)
                    .unwrap_or(1)
            })
            .await;

        for d in &deliveries {
            info!(kind = %kind, attempt = d.attempt, "Claimed pending job {} from stream", d.job.job_id());
        }
        Ok(deliveries)
    }

    async fn len(&self, kind: JobKind) -> QueueResult<u64> {
        let mut conn = self.conn().await?;
        let ready: u64 = conn.xlen(self.config.stream_key(kind)).await?;
        let delayed: u64 = conn.zcard(self.config.delayed_key(kind)).await?;
        Ok(ready + delayed)
    }

    async fn dlq_len(&self, kind: JobKind) -> QueueResult<u64> {
        let mut conn = self.conn().await?;
        let len: u64 = conn.xlen(self.config.dlq_key(kind)).await?;
        Ok(len)
    }

    async fn dead_letters(&self, kind: JobKind, limit: usize) -> QueueResult<Vec<DeadLetter>> {
        let mut conn = self.conn().await?;
        let reply: StreamRangeReply = redis::cmd("XREVRANGE")
            .arg(self.config.dlq_key(kind))
            .arg("+")
            .arg("-")
            .arg("COUNT")
            .arg(limit)
            .query_async(&mut conn)
            .await?;

        let mut letters = Vec::with_capacity(reply.ids.len());
        for entry in reply.ids {
            let Some(payload) = entry.get::<String>("job") else {
                continue;
            };
            let job = match serde_json::from_str::<QueueJob>(&payload) {
                Ok(job) => job,
                Err(e) => {
                    warn!(message_id = %entry.id, "Skipping unreadable dead letter: {}", e);
                    continue;
                }
            };
            let failed_at = entry
                .get::<String>("failed_at")
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or_else(Utc::now);
            letters.push(DeadLetter {
                message_id: entry.get("original_id").unwrap_or_else(|| entry.id.clone()),
                job,
                error: entry.get("error").unwrap_or_default(),
                attempts: entry.get("attempts").unwrap_or(0),
                failed_at,
            });
        }
        Ok(letters)
    }

    async fn key_holder(&self, idempotency_key: &str) -> QueueResult<Option<JobId>> {
        let mut conn = self.conn().await?;
        let holder: Option<String> = conn.get(self.config.dedup_key(idempotency_key)).await?;
        Ok(holder.map(JobId::from_string))
    }

    async fn ping(&self) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

/// Decode the job payload and the attempt it was enqueued as.
fn parse_entry(entry: &StreamId) -> Result<(QueueJob, u32), String> {
    let payload: String = entry
        .get("job")
        .ok_or_else(|| "missing job field".to_string())?;
    let job = serde_json::from_str::<QueueJob>(&payload).map_err(|e| e.to_string())?;
    let attempt = entry.get::<u32>("attempt").unwrap_or(1).max(1);
    Ok((job, attempt))
}
