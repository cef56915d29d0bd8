//! Job executor.
//!
//! One [`JobExecutor`] serves one job kind: it consumes deliveries, runs them
//! through a [`JobHandler`] under a concurrency limit, and applies the queue's
//! failure policy to whatever the handler returns.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use vedit_queue::{Delivery, FailureDisposition, JobBroker, JobKind, QueueJob};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;

/// Runs of the dead-letter hook before its failure is left to the API,
/// which releases render claims that no queued job backs.
const DEAD_LETTER_HOOK_ATTEMPTS: u32 = 3;

const DEAD_LETTER_HOOK_BACKOFF: Duration = Duration::from_millis(100);

/// Work performed for one job kind.
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn kind(&self) -> JobKind;

    async fn handle(&self, delivery: &Delivery) -> WorkerResult<()>;

    /// Called once a job has been moved to the dead-letter queue.
    async fn on_dead_letter(&self, _job: &QueueJob, _error: &str) -> WorkerResult<()> {
        Ok(())
    }
}

/// Job executor that processes jobs from the queue.
pub struct JobExecutor {
    config: WorkerConfig,
    broker: Arc<dyn JobBroker>,
    handler: Arc<dyn JobHandler>,
    concurrency: usize,
    job_semaphore: Arc<Semaphore>,
    shutdown: tokio::sync::watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(
        config: WorkerConfig,
        broker: Arc<dyn JobBroker>,
        handler: Arc<dyn JobHandler>,
    ) -> Self {
        let kind = handler.kind();
        let concurrency = config.concurrency_for(kind).max(1);
        let (shutdown, _) = tokio::sync::watch::channel(false);

        Self {
            config,
            broker,
            handler,
            concurrency,
            job_semaphore: Arc::new(Semaphore::new(concurrency)),
            shutdown,
            consumer_name: format!("{}-worker-{}", kind, Uuid::new_v4()),
        }
    }

    pub fn kind(&self) -> JobKind {
        self.handler.kind()
    }

    /// Start the executor. Returns after [`JobExecutor::shutdown`] once
    /// in-flight jobs finish or the shutdown timeout passes.
    pub async fn run(&self) -> WorkerResult<()> {
        let kind = self.kind();
        info!(
            kind = %kind,
            "Starting job executor '{}' with {} max concurrent jobs",
            self.consumer_name, self.concurrency
        );

        self.broker.init().await?;

        let mut shutdown_rx = self.shutdown.subscribe();
        let claim_task = self.spawn_claim_task();

        // Main job consumption loop
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!(kind = %kind, "Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs() => {
                    if let Err(e) = result {
                        error!(kind = %kind, "Error consuming jobs: {}", e);
                        // Back off on error
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();

        info!(kind = %kind, "Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!(kind = %kind, "Shutdown timeout reached with jobs still running");
        }

        info!(kind = %kind, "Job executor stopped");
        Ok(())
    }

    /// Periodically take over jobs left pending by crashed consumers.
    fn spawn_claim_task(&self) -> tokio::task::JoinHandle<()> {
        let broker = Arc::clone(&self.broker);
        let handler = Arc::clone(&self.handler);
        let semaphore = Arc::clone(&self.job_semaphore);
        let consumer_name = self.consumer_name.clone();
        let interval_period = self.config.claim_interval;
        let min_idle = self.config.claim_min_idle;
        let batch = self.config.batch_size;
        let mut shutdown_rx = self.shutdown.subscribe();
        let kind = self.kind();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(interval_period);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        match broker.claim_pending(kind, &consumer_name, min_idle, batch).await {
                            Ok(jobs) if !jobs.is_empty() => {
                                info!(kind = %kind, "Claimed {} pending jobs", jobs.len());
                                for delivery in jobs {
                                    let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                                        break;
                                    };
                                    let broker = Arc::clone(&broker);
                                    let handler = Arc::clone(&handler);
                                    tokio::spawn(async move {
                                        let _permit = permit;
                                        Self::process_delivery(broker.as_ref(), handler.as_ref(), delivery).await;
                                    });
                                }
                            }
                            Ok(_) => {}
                            Err(e) => {
                                warn!(kind = %kind, "Failed to claim pending jobs: {}", e);
                            }
                        }
                    }
                }
            }
        })
    }

    /// Consume and process jobs from the queue.
    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            // All slots busy, wait a bit
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let jobs = self
            .broker
            .consume(
                self.kind(),
                &self.consumer_name,
                self.config.block_ms,
                available.min(self.config.batch_size),
            )
            .await?;

        if jobs.is_empty() {
            return Ok(());
        }

        debug!(kind = %self.kind(), "Consumed {} jobs from queue", jobs.len());

        for delivery in jobs {
            let broker = Arc::clone(&self.broker);
            let handler = Arc::clone(&self.handler);
            let permit = Arc::clone(&self.job_semaphore)
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::job_failed("Semaphore closed"))?;

            tokio::spawn(async move {
                let _permit = permit;
                Self::process_delivery(broker.as_ref(), handler.as_ref(), delivery).await;
            });
        }

        Ok(())
    }

    /// Run one delivery and settle it with the broker.
    ///
    /// Success acks. A permanent failure is dead-lettered at once; anything
    /// else goes through the broker's retry policy.
    pub async fn process_delivery(broker: &dyn JobBroker, handler: &dyn JobHandler, delivery: Delivery) {
        let logger = JobLogger::new(&delivery);
        let kind = logger.kind();
        let span = logger.create_span();

        async {
            logger.log_start();
            let started = Instant::now();

            let result = handler.handle(&delivery).await;

            match result {
                Ok(()) => {
                    let elapsed = started.elapsed().as_secs_f64();
                    if let Err(e) = broker.ack(&delivery).await {
                        error!("Failed to ack job {}: {}", logger.job_id(), e);
                        return;
                    }
                    metrics::record_job_completed(kind, elapsed);
                    logger.log_completion(elapsed);
                }
                Err(e) => {
                    let permanent = e.is_permanent_failure();
                    let message = e.to_string();
                    metrics::record_job_failed(kind, permanent);

                    let disposition = if permanent {
                        broker
                            .dead_letter(&delivery, &message)
                            .await
                            .map(|_| FailureDisposition::DeadLettered)
                    } else {
                        broker.retry_or_dead_letter(&delivery, &message).await
                    };

                    match disposition {
                        Ok(FailureDisposition::Retry { attempt, delay }) => {
                            logger.log_retry(attempt, delay.as_millis() as u64, &message);
                        }
                        Ok(FailureDisposition::DeadLettered) => {
                            metrics::record_job_dead_lettered(kind);
                            logger.log_dead_letter(&message);
                            Self::run_dead_letter_hook(handler, &delivery.job, &message, &logger).await;
                        }
                        Err(queue_err) => {
                            // The delivery stays pending and is reclaimed later
                            error!(
                                "Failed to settle job {} after error '{}': {}",
                                logger.job_id(),
                                message,
                                queue_err
                            );
                        }
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Retry transient hook failures with a linear backoff.
    async fn run_dead_letter_hook(
        handler: &dyn JobHandler,
        job: &QueueJob,
        message: &str,
        logger: &JobLogger,
    ) {
        for attempt in 1..=DEAD_LETTER_HOOK_ATTEMPTS {
            let Err(e) = handler.on_dead_letter(job, message).await else {
                return;
            };
            if e.is_permanent_failure() || attempt == DEAD_LETTER_HOOK_ATTEMPTS {
                error!(
                    "Dead-letter cleanup failed for job {} after {} attempts: {}",
                    logger.job_id(),
                    attempt,
                    e
                );
                return;
            }
            warn!(
                "Dead-letter cleanup failed for job {} (attempt {}), retrying: {}",
                logger.job_id(),
                attempt,
                e
            );
            tokio::time::sleep(DEAD_LETTER_HOOK_BACKOFF * attempt).await;
        }
    }

    /// Process jobs inline until the queue stays empty for `idle`.
    ///
    /// Returns the number of deliveries handled. Used by single-shot runs
    /// and tests; long-running workers use [`JobExecutor::run`].
    pub async fn drain(&self, idle: Duration) -> WorkerResult<usize> {
        let mut processed = 0;
        loop {
            let jobs = self
                .broker
                .consume(
                    self.kind(),
                    &self.consumer_name,
                    idle.as_millis() as u64,
                    self.config.batch_size,
                )
                .await?;
            if jobs.is_empty() {
                return Ok(processed);
            }
            for delivery in jobs {
                Self::process_delivery(self.broker.as_ref(), self.handler.as_ref(), delivery).await;
                processed += 1;
            }
        }
    }

    /// Wait for all in-flight jobs to complete.
    async fn wait_for_jobs(&self) {
        while self.job_semaphore.available_permits() < self.concurrency {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use vedit_models::VideoId;
    use vedit_queue::{MemoryJobQueue, QueueConfig, RenderJob};

    /// Fails the first `failures` deliveries, then succeeds.
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
        dead_lettered: AtomicU32,
        cleanup_failures: AtomicU32,
        permanent: bool,
    }

    impl Flaky {
        fn new(failures: u32, permanent: bool) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                dead_lettered: AtomicU32::new(0),
                cleanup_failures: AtomicU32::new(0),
                permanent,
            }
        }

        /// The dead-letter hook fails `n` times before it succeeds.
        fn with_cleanup_failures(self, n: u32) -> Self {
            self.cleanup_failures.store(n, Ordering::SeqCst);
            self
        }
    }

    #[async_trait]
    impl JobHandler for Flaky {
        fn kind(&self) -> JobKind {
            JobKind::Render
        }

        async fn handle(&self, _delivery: &Delivery) -> WorkerResult<()> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                if self.permanent {
                    return Err(WorkerError::VideoNotFound("gone".to_string()));
                }
                return Err(WorkerError::job_failed("transient"));
            }
            Ok(())
        }

        async fn on_dead_letter(&self, _job: &QueueJob, _error: &str) -> WorkerResult<()> {
            self.dead_lettered.fetch_add(1, Ordering::SeqCst);
            let remaining = self.cleanup_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.cleanup_failures.store(remaining - 1, Ordering::SeqCst);
                return Err(WorkerError::job_failed("store unreachable"));
            }
            Ok(())
        }
    }

    fn broker() -> Arc<MemoryJobQueue> {
        Arc::new(MemoryJobQueue::new(
            QueueConfig::default()
                .with_max_attempts(3)
                .with_backoff(Duration::from_millis(1), Duration::from_millis(2)),
        ))
    }

    async fn run(handler: Arc<Flaky>) -> Arc<MemoryJobQueue> {
        let broker = broker();
        broker
            .enqueue(RenderJob::new(VideoId::new()).into())
            .await
            .unwrap();
        let executor = JobExecutor::new(WorkerConfig::default(), broker.clone(), handler);
        executor.drain(Duration::from_millis(50)).await.unwrap();
        broker
    }

    #[tokio::test]
    async fn transient_failure_is_retried_then_succeeds() {
        let handler = Arc::new(Flaky::new(2, false));
        let broker = run(handler.clone()).await;

        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        assert_eq!(handler.dead_lettered.load(Ordering::SeqCst), 0);
        assert_eq!(broker.dlq_len(JobKind::Render).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn exhausted_attempts_dead_letter() {
        let handler = Arc::new(Flaky::new(10, false));
        let broker = run(handler.clone()).await;

        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        assert_eq!(handler.dead_lettered.load(Ordering::SeqCst), 1);
        assert_eq!(broker.dlq_len(JobKind::Render).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn permanent_failure_skips_retries() {
        let handler = Arc::new(Flaky::new(10, true));
        let broker = run(handler.clone()).await;

        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(handler.dead_lettered.load(Ordering::SeqCst), 1);
        assert_eq!(broker.dlq_len(JobKind::Render).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_dead_letter_cleanup_is_retried() {
        let handler = Arc::new(Flaky::new(10, true).with_cleanup_failures(2));
        let broker = run(handler.clone()).await;

        assert_eq!(handler.dead_lettered.load(Ordering::SeqCst), 3);
        assert_eq!(handler.cleanup_failures.load(Ordering::SeqCst), 0);
        assert_eq!(broker.dlq_len(JobKind::Render).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn dead_letter_cleanup_gives_up_after_bounded_attempts() {
        let handler = Arc::new(Flaky::new(10, true).with_cleanup_failures(10));
        run(handler.clone()).await;

        assert_eq!(
            handler.dead_lettered.load(Ordering::SeqCst),
            DEAD_LETTER_HOOK_ATTEMPTS
        );
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let handler = Arc::new(Flaky::new(0, false));
        let broker = broker();
        let config = WorkerConfig {
            block_ms: 20,
            ..WorkerConfig::default()
        };
        let executor = Arc::new(JobExecutor::new(config, broker.clone(), handler.clone()));

        let running = {
            let executor = executor.clone();
            tokio::spawn(async move { executor.run().await })
        };
        broker
            .enqueue(RenderJob::new(VideoId::new()).into())
            .await
            .unwrap();

        for _ in 0..100 {
            if handler.calls.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        executor.shutdown();
        running.await.unwrap().unwrap();
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }
}
