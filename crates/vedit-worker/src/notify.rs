//! Notification worker and sinks.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use vedit_models::{JobId, VideoId};
use vedit_queue::{Delivery, JobKind, NotifyJob, QueueJob};

use crate::error::{WorkerError, WorkerResult};
use crate::executor::JobHandler;
use crate::metrics;

/// Event delivered when a render completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderCompleted {
    pub video_id: VideoId,
    pub render_job_id: JobId,
    pub final_path: String,
    pub message: String,
    pub completed_at: DateTime<Utc>,
}

impl RenderCompleted {
    pub fn from_job(job: &NotifyJob) -> Self {
        Self {
            video_id: job.video_id.clone(),
            render_job_id: job.render_job_id.clone(),
            final_path: job.final_path.clone(),
            message: format!("Your video {} has been rendered successfully!", job.video_id),
            completed_at: job.created_at,
        }
    }
}

/// Destination for render notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Short label used in metrics.
    fn name(&self) -> &'static str;

    async fn send(&self, event: &RenderCompleted) -> WorkerResult<()>;
}

/// Writes the notification to the log.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn send(&self, event: &RenderCompleted) -> WorkerResult<()> {
        info!(
            video_id = %event.video_id,
            render_job_id = %event.render_job_id,
            final_path = %event.final_path,
            "{}", event.message
        );
        Ok(())
    }
}

/// POSTs the event as JSON. Any non-2xx response is a failure.
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>) -> WorkerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| WorkerError::config_error(format!("webhook client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, event: &RenderCompleted) -> WorkerResult<()> {
        let response = self
            .client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .map_err(|e| WorkerError::notify_failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WorkerError::notify_failed(format!(
                "webhook returned {}",
                status
            )));
        }
        Ok(())
    }
}

/// Handler for `notify` jobs. Never touches the video record.
pub struct NotificationWorker {
    sink: Arc<dyn NotificationSink>,
}

impl NotificationWorker {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }

    /// Webhook sink when a URL is configured, log sink otherwise.
    pub fn from_webhook_url(url: Option<&str>) -> WorkerResult<Self> {
        let sink: Arc<dyn NotificationSink> = match url {
            Some(url) => Arc::new(WebhookSink::new(url)?),
            None => Arc::new(LogSink),
        };
        Ok(Self::new(sink))
    }
}

#[async_trait]
impl JobHandler for NotificationWorker {
    fn kind(&self) -> JobKind {
        JobKind::Notify
    }

    async fn handle(&self, delivery: &Delivery) -> WorkerResult<()> {
        let QueueJob::Notify(job) = &delivery.job else {
            return Err(WorkerError::job_failed(format!(
                "notification worker received {} job",
                delivery.job.kind()
            )));
        };

        self.sink.send(&RenderCompleted::from_job(job)).await?;
        metrics::record_notification_sent(self.sink.name());
        Ok(())
    }
}
