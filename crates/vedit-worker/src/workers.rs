//! Both executors wired together, for the worker binary and embedded mode.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::error;
use vedit_queue::JobBroker;

use crate::config::WorkerConfig;
use crate::error::WorkerResult;
use crate::executor::JobExecutor;
use crate::notify::NotificationWorker;
use crate::render::RenderWorker;

/// Render and notification executors sharing one broker.
pub struct Workers {
    render: Arc<JobExecutor>,
    notify: Arc<JobExecutor>,
}

impl Workers {
    /// Fails when the claim window would let crash recovery steal a render
    /// that may still be live.
    pub fn new(
        config: WorkerConfig,
        broker: Arc<dyn JobBroker>,
        render: RenderWorker,
        notify: NotificationWorker,
    ) -> WorkerResult<Self> {
        config.check_claim_window(render.lock_window())?;
        Ok(Self {
            render: Arc::new(JobExecutor::new(
                config.clone(),
                Arc::clone(&broker),
                Arc::new(render),
            )),
            notify: Arc::new(JobExecutor::new(config, broker, Arc::new(notify))),
        })
    }

    pub fn render(&self) -> &JobExecutor {
        &self.render
    }

    pub fn notify(&self) -> &JobExecutor {
        &self.notify
    }

    /// Run both executors on their own tasks.
    pub fn spawn(&self) -> Vec<JoinHandle<WorkerResult<()>>> {
        [Arc::clone(&self.render), Arc::clone(&self.notify)]
            .into_iter()
            .map(|executor| {
                tokio::spawn(async move {
                    let result = executor.run().await;
                    if let Err(e) = &result {
                        error!(kind = %executor.kind(), "Executor error: {}", e);
                    }
                    result
                })
            })
            .collect()
    }

    pub fn shutdown(&self) {
        self.render.shutdown();
        self.notify.shutdown();
    }
}
