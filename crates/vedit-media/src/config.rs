//! Transcode configuration.

use std::time::Duration;

use vedit_models::EncodingConfig;

/// Transcode configuration.
#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// Upper bound on one ffmpeg run
    pub timeout: Duration,
    /// Maximum concurrent ffmpeg processes in this process
    pub max_parallel: usize,
    /// Font file for subtitle overlays
    pub font_file: Option<String>,
    /// Encoding profile for every produced artifact
    pub encoding: EncodingConfig,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1800), // 30 minutes
            max_parallel: default_parallelism(),
            font_file: None,
            encoding: EncodingConfig::default(),
        }
    }
}

impl MediaConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            timeout: Duration::from_secs(
                std::env::var("FFMPEG_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.timeout.as_secs()),
            ),
            max_parallel: std::env::var("FFMPEG_MAX_PARALLEL")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_parallel),
            font_file: std::env::var("DRAWTEXT_FONT_FILE")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            encoding: EncodingConfig {
                preset: std::env::var("FFMPEG_PRESET")
                    .unwrap_or_else(|_| defaults.encoding.preset.clone()),
                crf: std::env::var("FFMPEG_CRF")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.encoding.crf),
                ..defaults.encoding.clone()
            },
        }
    }
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
}
