//! Redis Streams queue tests. Run with a local Redis:
//! `REDIS_URL=redis://localhost:6379 cargo test -p vedit-queue -- --ignored`

use std::time::Duration;

use vedit_models::{JobId, VideoId};
use vedit_queue::{
    FailureDisposition, JobBroker, JobKind, JobQueue, NotifyJob, QueueConfig, RenderJob,
};

fn queue() -> JobQueue {
    dotenvy::dotenv().ok();
    let config = QueueConfig {
        key_prefix: format!("vedit-test-{}", uuid_suffix()),
        ..QueueConfig::from_env()
    }
    .with_backoff(Duration::from_millis(10), Duration::from_millis(50));
    JobQueue::new(config).expect("redis client")
}

fn uuid_suffix() -> String {
    VideoId::new().as_str()[..8].to_string()
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn enqueue_consume_ack() {
    let queue = queue();
    queue.init().await.unwrap();

    let job = RenderJob::new(VideoId::new());
    queue.enqueue(job.clone().into()).await.unwrap();
    assert_eq!(
        queue.key_holder(&job.idempotency_key()).await.unwrap(),
        Some(job.job_id.clone())
    );

    let deliveries = queue.consume(JobKind::Render, "t1", 100, 10).await.unwrap();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].job.job_id(), &job.job_id);
    assert_eq!(deliveries[0].attempt, 1);

    queue.ack(&deliveries[0]).await.unwrap();
    assert_eq!(queue.len(JobKind::Render).await.unwrap(), 0);
    assert_eq!(queue.key_holder(&job.idempotency_key()).await.unwrap(), None);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn duplicate_notify_is_rejected() {
    let queue = queue();
    queue.init().await.unwrap();

    let render_job = JobId::new();
    let video = VideoId::new();
    queue
        .enqueue(NotifyJob::new(video.clone(), render_job.clone(), "a.mp4").into())
        .await
        .unwrap();
    let err = queue
        .enqueue(NotifyJob::new(video, render_job, "a.mp4").into())
        .await
        .unwrap_err();
    assert!(err.is_duplicate());
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn retries_are_promoted_then_dead_lettered() {
    let queue = queue();
    queue.init().await.unwrap();
    queue
        .enqueue(RenderJob::new(VideoId::new()).into())
        .await
        .unwrap();

    let mut attempts = Vec::new();
    loop {
        let mut got = queue.consume(JobKind::Render, "t1", 100, 1).await.unwrap();
        if got.is_empty() {
            tokio::time::sleep(Duration::from_millis(20)).await;
            continue;
        }
        let delivery = got.remove(0);
        attempts.push(delivery.attempt);
        if queue.retry_or_dead_letter(&delivery, "boom").await.unwrap()
            == FailureDisposition::DeadLettered
        {
            break;
        }
    }

    assert_eq!(attempts, vec![1, 2, 3]);
    assert_eq!(queue.dlq_len(JobKind::Render).await.unwrap(), 1);
    let letters = queue.dead_letters(JobKind::Render, 5).await.unwrap();
    assert_eq!(letters[0].error, "boom");
    assert_eq!(letters[0].attempts, 3);
}
