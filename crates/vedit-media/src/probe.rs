//! Media inspection through ffprobe.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};

/// What ffprobe reports about an uploaded or edited file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Seconds
    pub duration: f64,
    pub width: u32,
    pub height: u32,
    pub codec: String,
    /// Bytes, as reported by the container
    pub size: u64,
}

// Shape of `ffprobe -print_format json -show_entries ...`. Numeric format
// fields arrive as strings.
#[derive(Deserialize)]
struct Report {
    #[serde(default)]
    streams: Vec<Stream>,
    format: Container,
}

#[derive(Deserialize)]
struct Stream {
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Deserialize)]
struct Container {
    duration: Option<String>,
    size: Option<String>,
}

/// Inspect the first video stream and container of `path`.
pub async fn probe_video(path: impl AsRef<Path>) -> MediaResult<VideoInfo> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }
    check_ffprobe()?;

    let output = Command::new("ffprobe")
        .args(["-v", "error", "-select_streams", "v:0"])
        .args(["-show_entries", "stream=codec_name,width,height:format=duration,size"])
        .args(["-print_format", "json"])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .await?;

    if output.status.success() {
        return decode_report(&output.stdout);
    }
    Err(MediaError::FfprobeFailed {
        message: format!("ffprobe could not read {}", path.display()),
        stderr: Some(String::from_utf8_lossy(&output.stderr).trim().to_string()),
    })
}

/// Duration of `path` in seconds.
pub async fn get_duration(path: impl AsRef<Path>) -> MediaResult<f64> {
    probe_video(path).await.map(|info| info.duration)
}

fn decode_report(stdout: &[u8]) -> MediaResult<VideoInfo> {
    let Report { streams, format } = serde_json::from_slice(stdout)?;

    let Some(stream) = streams.into_iter().next() else {
        return Err(MediaError::InvalidVideo("No video stream found".into()));
    };

    let duration = match format.duration.as_deref().map(str::parse::<f64>) {
        Some(Ok(d)) if d.is_finite() && d > 0.0 => d,
        _ => return Err(MediaError::InvalidVideo("Media duration is unknown".into())),
    };

    Ok(VideoInfo {
        duration,
        width: stream.width.unwrap_or_default(),
        height: stream.height.unwrap_or_default(),
        codec: stream.codec_name.unwrap_or_default(),
        size: format
            .size
            .and_then(|s| s.parse().ok())
            .unwrap_or_default(),
    })
}
