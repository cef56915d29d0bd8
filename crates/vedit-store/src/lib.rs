//! Video record storage.
//!
//! This crate provides:
//! - The [`VideoRepository`] interface with conditional updates
//! - Redis and in-memory repositories
//! - Per-video mutual exclusion via [`VideoLock`]

pub mod config;
pub mod error;
pub mod lock;
pub mod memory;
pub mod patch;
pub mod redis_repo;
pub mod repo;

pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use lock::{LockToken, MemoryVideoLock, RedisVideoLock, VideoLock};
pub use memory::MemoryVideoRepository;
pub use patch::{Precondition, VideoPatch};
pub use redis_repo::RedisVideoRepository;
pub use repo::VideoRepository;
