//! Structured job logging utilities.

use tracing::{error, info, warn, Span};
use vedit_queue::{Delivery, JobKind};

/// Job lifecycle logger carrying the job's identifying fields.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    video_id: String,
    kind: JobKind,
    attempt: u32,
}

impl JobLogger {
    pub fn new(delivery: &Delivery) -> Self {
        Self {
            job_id: delivery.job.job_id().to_string(),
            video_id: delivery.job.video_id().to_string(),
            kind: delivery.job.kind(),
            attempt: delivery.attempt,
        }
    }

    pub fn log_start(&self) {
        info!(
            job_id = %self.job_id,
            video_id = %self.video_id,
            kind = %self.kind,
            attempt = self.attempt,
            "Job started"
        );
    }

    pub fn log_progress(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            video_id = %self.video_id,
            kind = %self.kind,
            "Job progress: {}", message
        );
    }

    pub fn log_completion(&self, elapsed_secs: f64) {
        info!(
            job_id = %self.job_id,
            video_id = %self.video_id,
            kind = %self.kind,
            elapsed_secs,
            "Job completed"
        );
    }

    pub fn log_retry(&self, next_attempt: u32, delay_ms: u64, error: &str) {
        warn!(
            job_id = %self.job_id,
            video_id = %self.video_id,
            kind = %self.kind,
            next_attempt,
            delay_ms,
            "Job failed, will retry: {}", error
        );
    }

    pub fn log_dead_letter(&self, error: &str) {
        error!(
            job_id = %self.job_id,
            video_id = %self.video_id,
            kind = %self.kind,
            attempt = self.attempt,
            "Job dead-lettered: {}", error
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Span wrapping everything the handler does for this delivery.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            video_id = %self.video_id,
            kind = %self.kind,
            attempt = self.attempt
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vedit_models::VideoId;
    use vedit_queue::RenderJob;

    #[test]
    fn logger_carries_job_fields() {
        let job = RenderJob::new(VideoId::from_string("v1"));
        let delivery = Delivery {
            message_id: "1-0".to_string(),
            job: job.clone().into(),
            attempt: 2,
        };
        let logger = JobLogger::new(&delivery);

        assert_eq!(logger.job_id(), job.job_id.as_str());
        assert_eq!(logger.kind(), JobKind::Render);
    }
}
