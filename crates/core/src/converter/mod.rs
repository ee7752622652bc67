//! Converter module for transcoding media files.
//!
//! This module provides the `Converter` trait and an FFmpeg implementation that
//! re-encodes the video stream of a file while keeping every other stream.
//!
//! # Example
//!
//! ```ignore
//! use grinder_core::converter::{FfmpegConverter, Converter, ConversionJob};
//!
//! let converter = FfmpegConverter::with_defaults();
//! converter.validate().await?;
//!
//! let job = ConversionJob {
//!     job_id: "4211".to_string(),
//!     input_path: PathBuf::from("/media/movies/Heat (1995)/Heat.avi"),
//!     output_path: PathBuf::from("/cache/4211/Heat.mkv"),
//! };
//!
//! let result = converter.convert(job).await?;
//! println!("Converted in {} ms", result.duration_ms);
//! ```

mod config;
mod error;
mod ffmpeg;
mod traits;
mod types;

pub use config::ConverterConfig;
pub use error::ConverterError;
pub use ffmpeg::FfmpegConverter;
pub use traits::Converter;
pub use types::{ConversionJob, ConversionResult};
