//! Axum HTTP API for the vedit pipeline.
//!
//! This crate provides:
//! - Upload, trim, subtitle, render and download endpoints under `/api/video`
//! - The pipeline coordinator behind them
//! - Rate limiting, request ids and security headers
//! - Prometheus metrics and JSON schemas of the public models

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

pub use config::{ApiConfig, Backend};
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::{PipelineError, PipelineResult, RenderAccepted, VideoService};
pub use state::{AppState, Backends};
