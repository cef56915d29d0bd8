//! Output profile for the final render.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// x264 settings applied when a video is rendered for download.
///
/// Missing fields deserialize to the [`Default`] profile, so a partial
/// override such as `{"crf": 23}` is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct EncodingConfig {
    pub video_codec: String,
    /// x264 speed/size tradeoff, e.g. `fast` or `slow`
    pub preset: String,
    /// 0-51, lower means higher quality
    pub crf: u8,
    pub audio_codec: String,
    pub audio_bitrate: String,
    /// Write the moov atom first so playback can start mid-download
    pub faststart: bool,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            video_codec: "libx264".into(),
            preset: "fast".into(),
            crf: 18,
            audio_codec: "aac".into(),
            audio_bitrate: "128k".into(),
            faststart: true,
        }
    }
}

impl EncodingConfig {
    /// Output-side ffmpeg flags for this profile.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        let pairs: [(&str, String); 5] = [
            ("-c:v", self.video_codec.clone()),
            ("-preset", self.preset.clone()),
            ("-crf", self.crf.to_string()),
            ("-c:a", self.audio_codec.clone()),
            ("-b:a", self.audio_bitrate.clone()),
        ];

        let mut args: Vec<String> = pairs
            .into_iter()
            .flat_map(|(flag, value)| [flag.to_string(), value])
            .collect();

        if self.faststart {
            args.push("-movflags".into());
            args.push("+faststart".into());
        }
        args
    }
}
