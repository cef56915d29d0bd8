//! ffmpeg invocation: argument assembly and supervised execution.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};
use crate::progress::{is_progress_line, FfmpegProgress};

const STDERR_TAIL_LINES: usize = 20;

/// One ffmpeg run from a single input file to a single output file.
///
/// Seek and duration go before `-i` so ffmpeg seeks on the input side;
/// filters and codec flags go after it.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: PathBuf,
    output: PathBuf,
    before_input: Vec<String>,
    after_input: Vec<String>,
}

impl FfmpegCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            before_input: Vec::new(),
            after_input: Vec::new(),
        }
    }

    /// Start reading the input at `seconds`.
    pub fn seek(mut self, seconds: f64) -> Self {
        self.before_input.extend(["-ss".into(), format!("{seconds:.3}")]);
        self
    }

    /// Read at most `seconds` of the input.
    pub fn duration(mut self, seconds: f64) -> Self {
        self.before_input.extend(["-t".into(), format!("{seconds:.3}")]);
        self
    }

    pub fn video_filter(mut self, filter: impl Into<String>) -> Self {
        self.after_input.extend(["-vf".into(), filter.into()]);
        self
    }

    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.after_input.extend(args.into_iter().map(Into::into));
        self
    }

    /// Full argument vector, excluding the program name.
    ///
    /// Progress is requested as key=value pairs on stderr, interleaved with
    /// error-level log lines.
    pub fn build_args(&self) -> Vec<String> {
        const PREAMBLE: [&str; 6] = ["-y", "-v", "error", "-progress", "pipe:2", "-nostats"];

        PREAMBLE
            .iter()
            .map(|s| s.to_string())
            .chain(self.before_input.iter().cloned())
            .chain(["-i".to_string(), self.input.to_string_lossy().into_owned()])
            .chain(self.after_input.iter().cloned())
            .chain(std::iter::once(self.output.to_string_lossy().into_owned()))
            .collect()
    }
}

/// Spawns ffmpeg, forwards progress, and enforces an optional deadline.
#[derive(Debug, Clone, Default)]
pub struct FfmpegRunner {
    timeout: Option<Duration>,
}

impl FfmpegRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Run `cmd`, calling `on_progress` for each completed progress block.
    ///
    /// A non-zero exit yields [`MediaError::FfmpegFailed`] carrying the last
    /// log lines ffmpeg wrote.
    pub async fn run_with_progress<F>(&self, cmd: &FfmpegCommand, on_progress: F) -> MediaResult<()>
    where
        F: Fn(FfmpegProgress) + Send + 'static,
    {
        check_ffmpeg()?;

        let args = cmd.build_args();
        debug!("ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("ffmpeg stderr was not captured"))?;
        let log_tail = tokio::spawn(drain_stderr(stderr, on_progress));

        let waited = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(waited) => waited,
                Err(_) => {
                    warn!("ffmpeg exceeded {:?}, killing it", limit);
                    let _ = child.kill().await;
                    return Err(MediaError::Timeout(limit.as_secs()));
                }
            },
            None => child.wait().await,
        };
        let tail = log_tail.await.unwrap_or_default();

        check_exit(waited?, tail)
    }
}

/// Feed progress lines to `on_progress` and return the last log lines.
async fn drain_stderr<R, F>(stderr: R, on_progress: F) -> String
where
    R: AsyncRead + Unpin,
    F: Fn(FfmpegProgress),
{
    let mut lines = BufReader::new(stderr).lines();
    let mut progress = FfmpegProgress::default();
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);

    while let Ok(Some(line)) = lines.next_line().await {
        if is_progress_line(&line) {
            if let Some(snapshot) = progress.apply_line(&line) {
                on_progress(snapshot);
            }
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    Vec::from(tail).join("\n")
}

fn check_exit(status: ExitStatus, tail: String) -> MediaResult<()> {
    if status.success() {
        return Ok(());
    }
    Err(MediaError::ffmpeg_failed(
        "FFmpeg exited with non-zero status",
        (!tail.is_empty()).then_some(tail),
        status.code(),
    ))
}

/// Locate `ffmpeg` on `PATH`.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::MissingBinary("ffmpeg"))
}

/// Locate `ffprobe` on `PATH`.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::MissingBinary("ffprobe"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(args: &[String], flag: &str) -> usize {
        args.iter().position(|a| a == flag).unwrap()
    }

    #[test]
    fn trim_flags_precede_input() {
        let args = FfmpegCommand::new("input.mp4", "output.mp4")
            .seek(10.0)
            .duration(30.0)
            .output_args(["-c:v", "libx264"])
            .build_args();

        let input = position(&args, "-i");
        assert!(position(&args, "-ss") < input);
        assert!(position(&args, "-t") < input);
        assert!(position(&args, "-c:v") > input);
        assert_eq!(args[position(&args, "-ss") + 1], "10.000");
        assert_eq!(args[0], "-y");
        assert_eq!(args.last().map(String::as_str), Some("output.mp4"));
    }

    #[test]
    fn filter_follows_input() {
        let args = FfmpegCommand::new("in.mp4", "out.mp4")
            .video_filter("drawtext=text='hi'")
            .build_args();
        let vf = position(&args, "-vf");
        assert!(vf > position(&args, "-i"));
        assert_eq!(args[vf + 1], "drawtext=text='hi'");
    }

    #[tokio::test]
    async fn drain_keeps_only_the_log_tail() {
        let mut log = String::new();
        for i in 0..30 {
            log.push_str(&format!("error line {i}\n"));
        }
        log.push_str("out_time_ms=1000\nprogress=continue\n");

        let seen = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = seen.clone();
        let tail = drain_stderr(log.as_bytes(), move |_| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        })
        .await;

        assert_eq!(tail.lines().count(), STDERR_TAIL_LINES);
        assert!(tail.starts_with("error line 10"));
        assert!(!tail.contains("out_time_ms"));
        assert_eq!(seen.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
