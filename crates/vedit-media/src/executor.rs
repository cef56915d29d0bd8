//! Edit operation executor.
//!
//! [`MediaExecutor`] is the seam between the pipeline and the transcode
//! engine. [`FfmpegExecutor`] is the production implementation: it bounds
//! concurrent ffmpeg processes with a semaphore sized to the host, applies
//! a per-run timeout, and publishes output only on success.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use vedit_models::EditOperation;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::config::MediaConfig;
use crate::error::{MediaError, MediaResult};
use crate::filters::{build_drawtext_filter, DrawTextOptions};
use crate::fs_utils::{move_file, partial_path, remove_if_exists};
use crate::probe;

/// Runs one edit operation from `input` into a new file at `output`.
///
/// Implementations never modify `input`, and leave nothing at `output`
/// when they fail.
#[async_trait]
pub trait MediaExecutor: Send + Sync {
    async fn execute(
        &self,
        input: &Path,
        operation: &EditOperation,
        output: &Path,
    ) -> MediaResult<()>;

    /// Media duration in seconds.
    async fn probe_duration(&self, path: &Path) -> MediaResult<f64>;
}

/// FFmpeg-backed executor.
pub struct FfmpegExecutor {
    config: MediaConfig,
    drawtext: DrawTextOptions,
    permits: Arc<Semaphore>,
}

impl FfmpegExecutor {
    pub fn new(config: MediaConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_parallel.max(1)));
        let drawtext = DrawTextOptions::default().with_font_file(config.font_file.clone());
        Self {
            config,
            drawtext,
            permits,
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> Self {
        Self::new(MediaConfig::from_env())
    }

    /// Build the ffmpeg invocation for `operation`.
    pub fn build_command(
        &self,
        input: &Path,
        operation: &EditOperation,
        output: &Path,
    ) -> FfmpegCommand {
        let encoding_args = self.config.encoding.to_ffmpeg_args();
        match operation {
            EditOperation::Trim { window } => FfmpegCommand::new(input, output)
                .seek(window.start)
                .duration(window.duration())
                .output_args(encoding_args),
            EditOperation::OverlayText { text, window } => FfmpegCommand::new(input, output)
                .video_filter(build_drawtext_filter(text, window, &self.drawtext))
                .output_args(encoding_args),
            EditOperation::FinalRender => {
                FfmpegCommand::new(input, output).output_args(encoding_args)
            }
        }
    }

    /// A trim starting at or past the end of the media can never produce output.
    ///
    /// An end time past the media end is left to ffmpeg, which stops at the
    /// last frame.
    async fn check_time_range(&self, input: &Path, operation: &EditOperation) -> MediaResult<()> {
        let EditOperation::Trim { window } = operation else {
            return Ok(());
        };

        match probe::get_duration(input).await {
            Ok(duration) if window.start >= duration => Err(MediaError::InvalidTimeRange {
                start: window.start,
                duration,
            }),
            Ok(_) => Ok(()),
            Err(e @ MediaError::InvalidVideo(_)) => Err(e),
            Err(e) => {
                warn!(input = %input.display(), "Skipping trim range check, probe failed: {}", e);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl MediaExecutor for FfmpegExecutor {
    async fn execute(
        &self,
        input: &Path,
        operation: &EditOperation,
        output: &Path,
    ) -> MediaResult<()> {
        if !tokio::fs::try_exists(input).await.unwrap_or(false) {
            return Err(MediaError::FileNotFound(input.to_path_buf()));
        }

        self.check_time_range(input, operation).await?;

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| MediaError::internal("transcode pool closed"))?;

        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let partial = partial_path(output);
        let cmd = self.build_command(input, operation, &partial);
        let runner = FfmpegRunner::new().with_timeout(self.config.timeout);
        let op = operation.as_str();

        info!(
            operation = op,
            input = %input.display(),
            output = %output.display(),
            "Starting transcode"
        );

        let started = Instant::now();
        let result = runner
            .run_with_progress(&cmd, move |p| {
                debug!(operation = op, out_time_ms = p.out_time_ms, speed = p.speed, "Transcode progress");
            })
            .await;
        let elapsed = started.elapsed().as_secs_f64();
        metrics::histogram!("vedit_transcode_duration_seconds", "operation" => op).record(elapsed);

        let result = match result {
            Ok(()) => move_file(&partial, output).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                info!(operation = op, output = %output.display(), elapsed_secs = elapsed, "Transcode finished");
                Ok(())
            }
            Err(e) => {
                metrics::counter!("vedit_transcode_failures_total", "operation" => op).increment(1);
                if let Err(cleanup) = remove_if_exists(&partial).await {
                    warn!(path = %partial.display(), "Failed to remove partial output: {}", cleanup);
                }
                Err(e)
            }
        }
    }

    async fn probe_duration(&self, path: &Path) -> MediaResult<f64> {
        probe::get_duration(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn executor() -> FfmpegExecutor {
        FfmpegExecutor::new(MediaConfig::default())
    }

    fn args_for(op: EditOperation) -> Vec<String> {
        executor()
            .build_command(Path::new("in.mp4"), &op, Path::new("out.part.mp4"))
            .build_args()
    }

    #[test]
    fn trim_seeks_and_limits_duration() {
        let args = args_for(EditOperation::trim(5.0, 15.0).unwrap());
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        let t = args.iter().position(|a| a == "-t").unwrap();
        assert_eq!(args[ss + 1], "5.000");
        assert_eq!(args[t + 1], "10.000");
        assert!(args.contains(&"libx264".to_string()));
    }

    #[test]
    fn overlay_uses_drawtext() {
        let args = args_for(EditOperation::overlay_text("Hello", 1.0, 2.0).unwrap());
        let vf = args.iter().position(|a| a == "-vf").unwrap();
        assert!(args[vf + 1].starts_with("drawtext="));
        assert!(args[vf + 1].contains("between(t,1,2)"));
        assert!(!args.contains(&"-ss".to_string()));
    }

    #[test]
    fn final_render_applies_encoding_profile() {
        let args = args_for(EditOperation::FinalRender);
        assert!(args.windows(2).any(|w| w[0] == "-movflags" && w[1] == "+faststart"));
        assert_eq!(args.last().unwrap(), "out.part.mp4");
    }

    #[tokio::test]
    async fn missing_input_is_reported() {
        let dir = tempfile::TempDir::new().unwrap();
        let output = dir.path().join("out.mp4");
        let err = executor()
            .execute(
                &PathBuf::from("/definitely/not/here.mp4"),
                &EditOperation::FinalRender,
                &output,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::FileNotFound(_)));
        assert!(!output.exists());
    }
}
