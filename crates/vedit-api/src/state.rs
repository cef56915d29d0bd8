//! Application state.

use std::sync::Arc;

use tracing::info;

use vedit_media::{ArtifactLayout, FfmpegExecutor, MediaExecutor};
use vedit_queue::{JobBroker, JobQueue, MemoryJobQueue, QueueConfig};
use vedit_store::{
    MemoryVideoLock, MemoryVideoRepository, RedisVideoLock, RedisVideoRepository, StoreConfig,
    VideoLock, VideoRepository,
};
use vedit_worker::{NotificationWorker, RenderWorker, WorkerConfig, WorkerResult, Workers};

use crate::config::{ApiConfig, Backend};
use crate::services::VideoService;

/// Storage, queue and transcoder shared by the API and embedded workers.
#[derive(Clone)]
pub struct Backends {
    pub videos: Arc<dyn VideoRepository>,
    pub locks: Arc<dyn VideoLock>,
    pub media: Arc<dyn MediaExecutor>,
    pub queue: Arc<dyn JobBroker>,
    pub layout: ArtifactLayout,
    pub store_config: StoreConfig,
}

impl Backends {
    /// Redis-backed queue, records and locks.
    pub fn redis(
        store_config: StoreConfig,
        queue_config: QueueConfig,
        media: Arc<dyn MediaExecutor>,
        layout: ArtifactLayout,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Self {
            videos: Arc::new(RedisVideoRepository::new(store_config.clone())?),
            locks: Arc::new(RedisVideoLock::new(store_config.clone())?),
            media,
            queue: Arc::new(JobQueue::new(queue_config)?),
            layout,
            store_config,
        })
    }

    /// In-process queue, records and locks.
    pub fn memory(
        store_config: StoreConfig,
        queue_config: QueueConfig,
        media: Arc<dyn MediaExecutor>,
        layout: ArtifactLayout,
    ) -> Self {
        Self {
            videos: Arc::new(MemoryVideoRepository::new()),
            locks: Arc::new(MemoryVideoLock::new()),
            media,
            queue: Arc::new(MemoryJobQueue::new(queue_config)),
            layout,
            store_config,
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub videos: VideoService,
    pub store: Arc<dyn VideoRepository>,
    pub queue: Arc<dyn JobBroker>,
    backends: Backends,
}

impl AppState {
    /// Create new application state from the environment.
    pub async fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let store_config = StoreConfig::from_env();
        let queue_config = QueueConfig::from_env();
        let media: Arc<dyn MediaExecutor> = Arc::new(FfmpegExecutor::from_env());
        let layout = ArtifactLayout::from_env();
        layout.ensure_dirs().await?;

        let backends = match config.backend {
            Backend::Redis => Backends::redis(store_config, queue_config, media, layout)?,
            Backend::Memory => {
                info!("Using in-memory queue and store");
                Backends::memory(store_config, queue_config, media, layout)
            }
        };
        backends.queue.init().await?;

        Ok(Self::with_backends(config, backends))
    }

    /// Assemble state around existing backends.
    pub fn with_backends(config: ApiConfig, backends: Backends) -> Self {
        let videos = VideoService::new(
            Arc::clone(&backends.videos),
            Arc::clone(&backends.locks),
            Arc::clone(&backends.media),
            Arc::clone(&backends.queue),
            backends.layout.clone(),
        )
        .with_lock_timing(backends.store_config.lock_ttl, backends.store_config.lock_wait);

        Self {
            config,
            videos,
            store: Arc::clone(&backends.videos),
            queue: Arc::clone(&backends.queue),
            backends,
        }
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.backends.layout
    }

    /// Render and notification workers sharing this process's backends.
    pub fn workers(&self, config: WorkerConfig) -> WorkerResult<Workers> {
        let b = &self.backends;
        let render = RenderWorker::new(
            Arc::clone(&b.videos),
            Arc::clone(&b.locks),
            Arc::clone(&b.media),
            Arc::clone(&b.queue),
            b.layout.clone(),
        )
        .with_lock_timing(b.store_config.lock_ttl, b.store_config.lock_wait);
        let notify = NotificationWorker::from_webhook_url(config.webhook_url.as_deref())?;

        Workers::new(config, Arc::clone(&b.queue), render, notify)
    }
}
