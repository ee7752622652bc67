use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::converter::{ConversionJob, Converter, ConverterError};
use crate::library::{MediaItem, PathMapper};
use crate::metrics;

/// Numeric outcome of one transcode run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultCode(pub i32);

impl ResultCode {
    pub const SUCCESS: Self = Self(0);
    /// The run task panicked.
    pub const UNEXPECTED: Self = Self(1);
    pub const INTERRUPTED: Self = Self(255);
    /// No backing file, or the file is not reachable locally.
    pub const SOURCE_MISSING: Self = Self(404);
    pub const MULTIPLE_SOURCES: Self = Self(405);
    pub const ENGINE_FAILURE: Self = Self(500);

    pub fn code(self) -> i32 {
        self.0
    }

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscoderState {
    Idle,
    Busy,
}

/// A reaped transcode.
#[derive(Debug, Clone)]
pub struct TranscodeOutcome {
    pub item: MediaItem,
    pub code: ResultCode,
    pub duration_ms: u64,
}

struct Running {
    item: MediaItem,
    started: Instant,
    handle: JoinHandle<ResultCode>,
}

/// Runs one transcode at a time in a background task.
pub struct Transcoder {
    id: usize,
    converter: Arc<dyn Converter>,
    mapper: Arc<PathMapper>,
    cache_dir: PathBuf,
    readonly: bool,
    running: Option<Running>,
}

impl Transcoder {
    pub fn new(
        id: usize,
        converter: Arc<dyn Converter>,
        mapper: Arc<PathMapper>,
        cache_dir: impl Into<PathBuf>,
        readonly: bool,
    ) -> Self {
        Self {
            id,
            converter,
            mapper,
            cache_dir: cache_dir.into(),
            readonly,
            running: None,
        }
    }

    /// Builds a transcoder once the engine is usable.
    pub async fn create(
        id: usize,
        converter: Arc<dyn Converter>,
        mapper: Arc<PathMapper>,
        cache_dir: PathBuf,
        readonly: bool,
    ) -> Result<Self, ConverterError> {
        converter.validate().await?;
        debug!(transcoder = id, engine = converter.name(), "Engine validated");
        Ok(Self::new(id, converter, mapper, cache_dir, readonly))
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn state(&self) -> TranscoderState {
        if self.running.is_some() {
            TranscoderState::Busy
        } else {
            TranscoderState::Idle
        }
    }

    pub fn is_idle(&self) -> bool {
        self.running.is_none()
    }

    /// The item being transcoded.
    pub fn current_item(&self) -> Option<&MediaItem> {
        self.running.as_ref().map(|r| &r.item)
    }

    pub fn is_transcoding(&self, rating_key: &str) -> bool {
        self.current_item()
            .is_some_and(|item| item.rating_key == rating_key)
    }

    /// Starts transcoding `item`. Returns false when already busy.
    pub fn process(&mut self, item: MediaItem) -> bool {
        if self.running.is_some() {
            return false;
        }

        let job = RunJob {
            item: item.clone(),
            converter: Arc::clone(&self.converter),
            mapper: Arc::clone(&self.mapper),
            cache_dir: self.cache_dir.clone(),
            readonly: self.readonly,
        };
        info!(
            transcoder = self.id,
            rating_key = %item.rating_key,
            title = %item.title,
            "Transcode started"
        );
        self.running = Some(Running {
            item,
            started: Instant::now(),
            handle: tokio::spawn(run(job)),
        });
        true
    }

    /// Collects a finished run and returns to `Idle`.
    pub async fn reap(&mut self) -> Option<TranscodeOutcome> {
        if !self.running.as_ref().is_some_and(|r| r.handle.is_finished()) {
            return None;
        }
        let running = self.running.take()?;

        let code = match running.handle.await {
            Ok(code) => code,
            Err(e) => {
                error!(
                    transcoder = self.id,
                    rating_key = %running.item.rating_key,
                    error = %e,
                    "Transcode task panicked"
                );
                ResultCode::UNEXPECTED
            }
        };
        let elapsed = running.started.elapsed();

        let label = code.to_string();
        metrics::TRANSCODE_RESULTS.with_label_values(&[&label]).inc();
        metrics::TRANSCODE_DURATION
            .with_label_values(&[&label])
            .observe(elapsed.as_secs_f64());

        info!(
            transcoder = self.id,
            rating_key = %running.item.rating_key,
            code = code.code(),
            duration_secs = elapsed.as_secs(),
            "Transcode finished"
        );

        Some(TranscodeOutcome {
            item: running.item,
            code,
            duration_ms: elapsed.as_millis() as u64,
        })
    }
}

struct RunJob {
    item: MediaItem,
    converter: Arc<dyn Converter>,
    mapper: Arc<PathMapper>,
    cache_dir: PathBuf,
    readonly: bool,
}

async fn run(job: RunJob) -> ResultCode {
    let key = &job.item.rating_key;

    let remote = match job.item.locations.as_slice() {
        [] => {
            warn!(rating_key = %key, "Item has no backing file");
            return ResultCode::SOURCE_MISSING;
        }
        [only] => only,
        many => {
            warn!(rating_key = %key, files = many.len(), "Item has multiple backing files");
            return ResultCode::MULTIPLE_SOURCES;
        }
    };

    let input = job.mapper.to_local(remote);
    if !tokio::fs::try_exists(&input).await.unwrap_or(false) {
        warn!(rating_key = %key, path = %input.display(), "Source file not found");
        return ResultCode::SOURCE_MISSING;
    }

    let item_dir = job.cache_dir.join(key);
    let output = item_dir.join(output_name(&input, key, job.converter.output_extension()));

    if job.readonly {
        info!(
            rating_key = %key,
            input = %input.display(),
            output = %output.display(),
            "Readonly: skipping transcode"
        );
        return ResultCode::SUCCESS;
    }

    let mut guard = CacheDirGuard::new(item_dir.clone());
    if let Err(e) = tokio::fs::create_dir_all(&item_dir).await {
        error!(rating_key = %key, path = %item_dir.display(), error = %e, "Failed to create cache directory");
        return ResultCode::ENGINE_FAILURE;
    }

    let conversion = ConversionJob {
        job_id: key.clone(),
        input_path: input,
        output_path: output,
    };
    match job.converter.convert(conversion).await {
        Ok(result) => {
            guard.keep();
            debug!(
                rating_key = %key,
                output = %result.output_path.display(),
                bytes = result.output_size_bytes,
                "Engine finished"
            );
            ResultCode::SUCCESS
        }
        Err(e) if e.is_missing_input() => {
            warn!(rating_key = %key, error = %e, "Source vanished before transcode");
            ResultCode::SOURCE_MISSING
        }
        Err(ConverterError::Interrupted) => {
            warn!(rating_key = %key, "Transcode interrupted");
            ResultCode::INTERRUPTED
        }
        Err(e) => {
            error!(rating_key = %key, error = %e, "Transcode failed");
            ResultCode::ENGINE_FAILURE
        }
    }
}

fn output_name(input: &Path, fallback: &str, extension: &str) -> String {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| fallback.to_string());
    format!("{}.{}", stem, extension)
}

/// Removes the per-item cache directory unless the run succeeded.
///
/// Removal happens in `Drop`, so a panicking engine call cleans up too.
struct CacheDirGuard {
    path: PathBuf,
    keep: bool,
}

impl CacheDirGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, keep: false }
    }

    fn keep(&mut self) {
        self.keep = true;
    }
}

impl Drop for CacheDirGuard {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed cache directory"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove cache directory"),
        }
    }
}
