//! FFmpeg-based converter implementation.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;

use super::config::ConverterConfig;
use super::error::ConverterError;
use super::traits::Converter;
use super::types::{ConversionJob, ConversionResult};

/// Exit code ffmpeg uses when it is asked to quit (`q`, SIGINT).
const FFMPEG_INTERRUPTED: i32 = 255;

/// FFmpeg-based converter implementation.
pub struct FfmpegConverter {
    config: ConverterConfig,
}

impl FfmpegConverter {
    /// Creates a new FFmpeg converter with the given configuration.
    pub fn new(config: ConverterConfig) -> Self {
        Self { config }
    }

    /// Creates a converter with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ConverterConfig::default())
    }

    /// Builds ffmpeg arguments: every stream is mapped, video is re-encoded,
    /// audio and subtitles follow their configured arguments.
    fn build_args(&self, input_path: &Path, output_path: &Path) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-nostdin".to_string(),
            "-loglevel".to_string(),
            self.config.ffmpeg_log_level.clone(),
            "-i".to_string(),
            input_path.to_string_lossy().to_string(),
            "-map".to_string(),
            "0".to_string(),
            "-c:v".to_string(),
            self.config.video_codec.clone(),
        ];

        args.extend(self.config.video_args.iter().cloned());
        args.extend(self.config.audio_args.iter().cloned());
        args.extend(self.config.subtitle_args.iter().cloned());
        args.extend(self.config.extra_ffmpeg_args.iter().cloned());

        args.push(output_path.to_string_lossy().to_string());
        args
    }

    async fn run_conversion(&self, job: &ConversionJob) -> Result<ConversionResult, ConverterError> {
        if !job.input_path.exists() {
            return Err(ConverterError::InputNotFound {
                path: job.input_path.clone(),
            });
        }
        if let Some(parent) = job.output_path.parent() {
            if !parent.is_dir() {
                return Err(ConverterError::OutputDirectoryFailed {
                    path: parent.to_path_buf(),
                });
            }
        }

        let start = Instant::now();
        let args = self.build_args(&job.input_path, &job.output_path);
        debug!(job_id = %job.job_id, args = ?args, "Starting ffmpeg");

        let mut child = Command::new(&self.config.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ConverterError::FfmpegNotFound {
                        path: self.config.ffmpeg_path.clone(),
                    }
                } else {
                    ConverterError::Io(e)
                }
            })?;

        let mut error_output = String::new();
        if let Some(stderr) = child.stderr.take() {
            let mut reader = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                if line.to_ascii_lowercase().contains("error") {
                    error_output.push_str(&line);
                    error_output.push('\n');
                }
            }
        }

        let status = child.wait().await?;
        match status.code() {
            Some(0) => {}
            None | Some(FFMPEG_INTERRUPTED) => return Err(ConverterError::Interrupted),
            Some(code) => {
                return Err(ConverterError::conversion_failed(
                    format!("FFmpeg exited with code: {}", code),
                    Some(code),
                    if error_output.is_empty() {
                        None
                    } else {
                        Some(error_output)
                    },
                ))
            }
        }

        let output_meta = tokio::fs::metadata(&job.output_path).await.map_err(|_| {
            ConverterError::conversion_failed("Output file not created", Some(0), None)
        })?;

        Ok(ConversionResult {
            job_id: job.job_id.clone(),
            output_path: job.output_path.clone(),
            output_size_bytes: output_meta.len(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[async_trait]
impl Converter for FfmpegConverter {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn output_extension(&self) -> &str {
        &self.config.container
    }

    async fn convert(&self, job: ConversionJob) -> Result<ConversionResult, ConverterError> {
        self.run_conversion(&job).await
    }

    async fn validate(&self) -> Result<(), ConverterError> {
        let result = Command::new(&self.config.ffmpeg_path)
            .arg("-version")
            .output()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ConverterError::FfmpegNotFound {
                    path: self.config.ffmpeg_path.clone(),
                })
            }
            Err(e) => Err(ConverterError::Io(e)),
        }
    }
}
