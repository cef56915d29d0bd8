//! Render pipeline workers.
//!
//! This crate provides:
//! - A generic job executor with bounded concurrency, crash recovery and
//!   graceful shutdown
//! - The render worker that produces final artifacts
//! - The notification worker and its sinks

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod notify;
pub mod render;
pub mod telemetry;
pub mod workers;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::{JobExecutor, JobHandler};
pub use logging::JobLogger;
pub use notify::{LogSink, NotificationSink, NotificationWorker, RenderCompleted, WebhookSink};
pub use render::RenderWorker;
pub use workers::Workers;
