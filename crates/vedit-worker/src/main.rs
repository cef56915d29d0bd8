//! Render and notification worker binary.

use std::sync::Arc;

use tracing::{error, info};

use vedit_media::{check_ffmpeg, ArtifactLayout, FfmpegExecutor};
use vedit_queue::{JobQueue, QueueConfig};
use vedit_store::{RedisVideoLock, RedisVideoRepository, StoreConfig};
use vedit_worker::{
    metrics::init_metrics, telemetry, NotificationWorker, RenderWorker, WorkerConfig, Workers,
};

#[tokio::main]
async fn main() {
    telemetry::install_crypto_provider();

    // Load environment variables
    dotenvy::dotenv().ok();

    telemetry::init_tracing();

    info!("Starting vedit-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    if let Some(port) = config.metrics_port {
        if let Err(e) = init_metrics(port) {
            error!("Failed to start metrics listener: {}", e);
            std::process::exit(1);
        }
        info!("Metrics listening on port {}", port);
    }

    if let Err(e) = check_ffmpeg() {
        error!("FFmpeg unavailable: {}", e);
        std::process::exit(1);
    }

    let layout = ArtifactLayout::from_env();
    if let Err(e) = layout.ensure_dirs().await {
        error!("Failed to create artifact directories: {}", e);
        std::process::exit(1);
    }

    let store_config = StoreConfig::from_env();
    let (queue, videos, locks) = match (
        JobQueue::new(QueueConfig::from_env()),
        RedisVideoRepository::new(store_config.clone()),
        RedisVideoLock::new(store_config.clone()),
    ) {
        (Ok(q), Ok(v), Ok(l)) => (Arc::new(q), Arc::new(v), Arc::new(l)),
        (Err(e), _, _) => {
            error!("Failed to create job queue: {}", e);
            std::process::exit(1);
        }
        (_, Err(e), _) | (_, _, Err(e)) => {
            error!("Failed to create video store: {}", e);
            std::process::exit(1);
        }
    };

    let render = RenderWorker::new(
        videos,
        locks,
        Arc::new(FfmpegExecutor::from_env()),
        queue.clone(),
        layout,
    )
    .with_lock_timing(store_config.lock_ttl, store_config.lock_wait);

    let notify = match NotificationWorker::from_webhook_url(config.webhook_url.as_deref()) {
        Ok(n) => n,
        Err(e) => {
            error!("Failed to create notification sink: {}", e);
            std::process::exit(1);
        }
    };

    let workers = match Workers::new(config, queue, render, notify) {
        Ok(w) => w,
        Err(e) => {
            error!("Invalid worker configuration: {}", e);
            std::process::exit(1);
        }
    };
    let handles = workers.spawn();

    tokio::signal::ctrl_c().await.ok();
    info!("Received shutdown signal");
    workers.shutdown();

    for handle in handles {
        handle.await.ok();
    }

    info!("Worker shutdown complete");
}
