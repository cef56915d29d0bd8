//! In-process job queue.
//!
//! Same delivery contract as the Redis queue, without durability across
//! restarts. Used for single-node deployments and in tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use vedit_models::JobId;

use crate::broker::{DeadLetter, Delivery, FailureDisposition, JobBroker};
use crate::config::QueueConfig;
use crate::error::{QueueError, QueueResult};
use crate::job::{JobKind, QueueJob};

#[derive(Debug, Clone)]
struct Entry {
    message_id: String,
    job: QueueJob,
    attempt: u32,
}

#[derive(Debug)]
struct Pending {
    entry: Entry,
    delivered_at: Instant,
}

#[derive(Debug, Default)]
struct KindState {
    ready: VecDeque<Entry>,
    delayed: Vec<(Instant, Entry)>,
    pending: HashMap<String, Pending>,
    dlq: Vec<DeadLetter>,
}

impl KindState {
    fn promote_due(&mut self, now: Instant) {
        let (due, waiting): (Vec<_>, Vec<_>) =
            self.delayed.drain(..).partition(|(at, _)| *at <= now);
        self.delayed = waiting;
        self.ready.extend(due.into_iter().map(|(_, e)| e));
    }

    fn next_due(&self) -> Option<Instant> {
        self.delayed.iter().map(|(at, _)| *at).min()
    }
}

#[derive(Debug)]
struct DedupEntry {
    job_id: JobId,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct State {
    kinds: HashMap<JobKind, KindState>,
    dedup: HashMap<String, DedupEntry>,
}

impl State {
    fn purge_expired_keys(&mut self, now: Instant) {
        self.dedup.retain(|_, entry| entry.expires_at > now);
    }
}

/// In-memory [`JobBroker`].
pub struct MemoryJobQueue {
    config: QueueConfig,
    state: Mutex<State>,
    notify: Notify,
    seq: AtomicU64,
}

impl MemoryJobQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State::default()),
            notify: Notify::new(),
            seq: AtomicU64::new(0),
        }
    }

    fn next_message_id(&self) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", Utc::now().timestamp_millis(), seq)
    }

    fn lock(&self) -> QueueResult<std::sync::MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| QueueError::connection_failed("memory queue lock poisoned"))
    }

    /// Remove a pending delivery, releasing its dedup key if the job allows it.
    fn finish(state: &mut State, delivery: &Delivery) -> Option<Entry> {
        let kind = delivery.job.kind();
        let removed = state
            .kinds
            .entry(kind)
            .or_default()
            .pending
            .remove(&delivery.message_id)
            .map(|p| p.entry);
        if delivery.job.releases_key_on_finish() {
            state.dedup.remove(&delivery.job.idempotency_key());
        }
        removed
    }
}

impl Default for MemoryJobQueue {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}

#[async_trait]
impl JobBroker for MemoryJobQueue {
    async fn init(&self) -> QueueResult<()> {
        Ok(())
    }

    async fn enqueue(&self, job: QueueJob) -> QueueResult<String> {
        let message_id = self.next_message_id();
        {
            let mut state = self.lock()?;
            let now = Instant::now();
            state.purge_expired_keys(now);
            let key = job.idempotency_key();
            if state.dedup.contains_key(&key) {
                warn!("Duplicate job rejected: {}", key);
                return Err(QueueError::duplicate(key));
            }
            state.dedup.insert(
                key,
                DedupEntry {
                    job_id: job.job_id().clone(),
                    expires_at: now + self.config.dedup_ttl,
                },
            );
            info!(
                kind = %job.kind(),
                "Enqueued job {} with message ID {}",
                job.job_id(),
                message_id
            );
            state.kinds.entry(job.kind()).or_default().ready.push_back(Entry {
                message_id: message_id.clone(),
                job,
                attempt: 1,
            });
        }
        self.notify.notify_waiters();
        Ok(message_id)
    }

    async fn consume(
        &self,
        kind: JobKind,
        _consumer: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let deadline = Instant::now() + Duration::from_millis(block_ms);

        loop {
            // Register interest before inspecting state so an enqueue in
            // between is not missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next_due = {
                let mut state = self.lock()?;
                let now = Instant::now();
                let ks = state.kinds.entry(kind).or_default();
                ks.promote_due(now);

                let take = count.max(1).min(ks.ready.len());
                if take > 0 {
                    let mut out = Vec::with_capacity(take);
                    for entry in ks.ready.drain(..take) {
                        out.push(Delivery {
                            message_id: entry.message_id.clone(),
                            job: entry.job.clone(),
                            attempt: entry.attempt,
                        });
                        ks.pending.insert(
                            entry.message_id.clone(),
                            Pending {
                                entry,
                                delivered_at: now,
                            },
                        );
                    }
                    return Ok(out);
                }
                ks.next_due()
            };

            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            let wake_at = next_due.map_or(deadline, |due| due.min(deadline));
            let _ = tokio::time::timeout_at(wake_at, notified).await;
        }
    }

    async fn ack(&self, delivery: &Delivery) -> QueueResult<()> {
        let mut state = self.lock()?;
        Self::finish(&mut state, delivery);
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

        let delay = self.config.backoff_for(delivery.attempt);
        let next_attempt = delivery.attempt + 1;
        {
            let mut state = self.lock()?;
            let ks = state.kinds.entry(delivery.job.kind()).or_default();
            ks.pending.remove(&delivery.message_id);
            ks.delayed.push((
                Instant::now() + delay,
                Entry {
                    message_id: self.next_message_id(),
                    job: delivery.job.clone(),
                    attempt: next_attempt,
                },
            ));
        }
        self.notify.notify_waiters();

        info!(
            kind = %delivery.job.kind(),
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
        let mut state = self.lock()?;
        Self::finish(&mut state, delivery);
        state
            .kinds
            .entry(delivery.job.kind())
            .or_default()
            .dlq
            .push(DeadLetter {
                message_id: delivery.message_id.clone(),
                job: delivery.job.clone(),
                error: error.to_string(),
                attempts: delivery.attempt,
                failed_at: Utc::now(),
            });
        warn!("Moved job {} to DLQ: {}", delivery.job.job_id(), error);
        Ok(())
    }

    async fn claim_pending(
        &self,
        kind: JobKind,
        _consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut state = self.lock()?;
        let now = Instant::now();
        let ks = state.kinds.entry(kind).or_default();

        let mut claimed = Vec::new();
        for pending in ks.pending.values_mut() {
            if claimed.len() >= count {
                break;
            }
            if now.duration_since(pending.delivered_at) < min_idle {
                continue;
            }
            pending.entry.attempt += 1;
            pending.delivered_at = now;
            info!(kind = %kind, attempt = pending.entry.attempt, "Claimed pending job {}", pending.entry.job.job_id());
            claimed.push(Delivery {
                message_id: pending.entry.message_id.clone(),
                job: pending.entry.job.clone(),
                attempt: pending.entry.attempt,
            });
        }
        Ok(claimed)
    }

    async fn key_holder(&self, idempotency_key: &str) -> QueueResult<Option<JobId>> {
        let mut state = self.lock()?;
        state.purge_expired_keys(Instant::now());
        Ok(state.dedup.get(idempotency_key).map(|entry| entry.job_id.clone()))
    }

    async fn len(&self, kind: JobKind) -> QueueResult<u64> {
        let state = self.lock()?;
        Ok(state
            .kinds
            .get(&kind)
            .map(|ks| (ks.ready.len() + ks.delayed.len() + ks.pending.len()) as u64)
            .unwrap_or(0))
    }

    async fn dlq_len(&self, kind: JobKind) -> QueueResult<u64> {
        let state = self.lock()?;
        Ok(state.kinds.get(&kind).map(|ks| ks.dlq.len() as u64).unwrap_or(0))
    }

    async fn dead_letters(&self, kind: JobKind, limit: usize) -> QueueResult<Vec<DeadLetter>> {
        let state = self.lock()?;
        Ok(state
            .kinds
            .get(&kind)
            .map(|ks| ks.dlq.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn ping(&self) -> QueueResult<()> {
        Ok(())
    }
}
