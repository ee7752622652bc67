//! Types for the converter module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A single conversion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionJob {
    /// Identifier used in logs; the item's rating key.
    pub job_id: String,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
}

/// Outcome of a successful conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionResult {
    pub job_id: String,
    pub output_path: PathBuf,
    pub output_size_bytes: u64,
    pub duration_ms: u64,
}
