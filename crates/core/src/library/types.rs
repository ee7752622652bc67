//! Types shared by library service clients.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rules::ItemField;

/// Errors from the library service.
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("connection to library service failed: {0}")]
    ConnectionFailed(String),

    #[error("library service rejected the token")]
    Unauthorized,

    #[error("library request timed out")]
    Timeout,

    #[error("library API error: {0}")]
    ApiError(String),

    #[error("failed to parse library response: {0}")]
    ParseError(String),

    #[error("unknown library section: {0}")]
    UnknownSection(String),

    /// The client was released while the service is being rewritten.
    #[error("library connection released")]
    Released,
}

/// One library entry as reported by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    /// Stable id the service assigns to the item ("rating key").
    pub rating_key: String,
    pub title: String,
    /// Section the item belongs to, used to scope rescans.
    pub section: String,
    /// Backing files, in the library service's path namespace.
    pub locations: Vec<String>,
    pub container: Option<String>,
    pub video_codec: Option<String>,
    pub video_resolution: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Overall bitrate in kbps.
    pub bitrate: Option<u64>,
    /// Total size of the backing files in bytes.
    pub size: Option<u64>,
    /// Duration in milliseconds.
    pub duration: Option<u64>,
}

impl MediaItem {
    pub fn new(
        rating_key: impl Into<String>,
        title: impl Into<String>,
        section: impl Into<String>,
        locations: Vec<String>,
    ) -> Self {
        Self {
            rating_key: rating_key.into(),
            title: title.into(),
            section: section.into(),
            locations,
            container: None,
            video_codec: None,
            video_resolution: None,
            width: None,
            height: None,
            bitrate: None,
            size: None,
            duration: None,
        }
    }

    /// File name of the single backing file, if there is exactly one.
    pub fn file_name(&self) -> Option<&str> {
        match self.locations.as_slice() {
            [only] => Path::new(only).file_name().and_then(|n| n.to_str()),
            _ => None,
        }
    }

    pub fn text_field(&self, field: ItemField) -> Option<&str> {
        match field {
            ItemField::Container => self.container.as_deref(),
            ItemField::VideoCodec => self.video_codec.as_deref(),
            ItemField::VideoResolution => self.video_resolution.as_deref(),
            _ => None,
        }
    }

    pub fn numeric_field(&self, field: ItemField) -> Option<f64> {
        match field {
            ItemField::Width => self.width.map(f64::from),
            ItemField::Height => self.height.map(f64::from),
            ItemField::Bitrate => self.bitrate.map(|v| v as f64),
            ItemField::Size => self.size.map(|v| v as f64),
            ItemField::Duration => self.duration.map(|v| v as f64),
            _ => None,
        }
    }
}

/// Playback activity on the library service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub playing_sessions: u32,
    pub transcode_sessions: u32,
}

/// One resource-utilisation sample reported by the service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    pub host_cpu: f64,
    pub host_memory: f64,
    pub process_cpu: f64,
    pub process_memory: f64,
}

/// Weighted mean where later samples and larger values count more.
///
/// Computes `sqrt(sum(v_i^2 * (i + 1)) / sum(i + 1))`, so a recent spike
/// dominates an older quiet period.
pub fn weighted_mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let weights = n * (n + 1.0) / 2.0;
    let sum: f64 = values
        .iter()
        .enumerate()
        .map(|(i, v)| v * v * (i as f64 + 1.0))
        .sum();
    (sum / weights).sqrt()
}

/// Collapses resource samples into one utilisation figure per metric.
pub fn summarize_resources(samples: &[ResourceSample]) -> ResourceSample {
    let pick = |f: fn(&ResourceSample) -> f64| {
        weighted_mean(&samples.iter().map(f).collect::<Vec<_>>())
    };
    ResourceSample {
        host_cpu: pick(|s| s.host_cpu),
        host_memory: pick(|s| s.host_memory),
        process_cpu: pick(|s| s.process_cpu),
        process_memory: pick(|s| s.process_memory),
    }
}
