//! Durable job queue for the render pipeline.
//!
//! This crate provides:
//! - Render and notification job types with idempotency keys
//! - The [`JobBroker`] interface used by the API and the workers
//! - A Redis Streams implementation with delayed retries and a DLQ
//! - An in-process implementation for single-node setups and tests

pub mod broker;
pub mod config;
pub mod error;
pub mod job;
pub mod memory;
pub mod queue;

pub use broker::{DeadLetter, Delivery, FailureDisposition, JobBroker};
pub use config::QueueConfig;
pub use error::{QueueError, QueueResult};
pub use job::{JobKind, NotifyJob, QueueJob, RenderJob};
pub use memory::MemoryJobQueue;
pub use queue::JobQueue;
