//! Configuration for the converter module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Encoding settings for the ffmpeg converter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Path to ffmpeg binary.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[serde(default = "default_log_level")]
    pub ffmpeg_log_level: String,

    /// Video encoder passed to `-c:v`.
    #[serde(default = "default_video_codec")]
    pub video_codec: String,

    /// Encoder tuning, e.g. preset and CRF.
    #[serde(default = "default_video_args")]
    pub video_args: Vec<String>,

    #[serde(default = "default_audio_args")]
    pub audio_args: Vec<String>,

    #[serde(default = "default_subtitle_args")]
    pub subtitle_args: Vec<String>,

    /// Output container; also the output file extension.
    #[serde(default = "default_container")]
    pub container: String,

    /// Appended right before the output path.
    #[serde(default)]
    pub extra_ffmpeg_args: Vec<String>,
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_log_level() -> String {
    "error".to_string()
}

fn default_video_codec() -> String {
    "libx265".to_string()
}

fn default_video_args() -> Vec<String> {
    ["-preset", "medium", "-crf", "24"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_audio_args() -> Vec<String> {
    vec!["-c:a".to_string(), "copy".to_string()]
}

fn default_subtitle_args() -> Vec<String> {
    vec!["-c:s".to_string(), "copy".to_string()]
}

fn default_container() -> String {
    "mkv".to_string()
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            ffmpeg_log_level: default_log_level(),
            video_codec: default_video_codec(),
            video_args: default_video_args(),
            audio_args: default_audio_args(),
            subtitle_args: default_subtitle_args(),
            container: default_container(),
            extra_ffmpeg_args: Vec::new(),
        }
    }
}

impl ConverterConfig {
    /// Sets the ffmpeg binary.
    pub fn with_ffmpeg_path(mut self, path: PathBuf) -> Self {
        self.ffmpeg_path = path;
        self
    }

    /// Sets the video encoder and its arguments.
    pub fn with_video(mut self, codec: impl Into<String>, args: Vec<String>) -> Self {
        self.video_codec = codec.into();
        self.video_args = args;
        self
    }

    /// Sets the output container.
    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = container.into();
        self
    }
}
