//! Business logic services.

pub mod error;
pub mod video;

pub use error::{PipelineError, PipelineResult};
pub use video::{RenderAccepted, VideoService};
