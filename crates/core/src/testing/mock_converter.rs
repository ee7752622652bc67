//! Mock converter for testing.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::converter::{ConversionJob, ConversionResult, Converter, ConverterError};

/// How the mock answers the next conversions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversionBehavior {
    /// Writes a small output file and succeeds.
    #[default]
    Succeed,
    /// Fails like an engine error (non-zero exit).
    Fail,
    /// Fails as if the engine was interrupted.
    Interrupt,
    /// Fails as if the input vanished.
    MissingInput,
    /// Panics inside the conversion.
    Panic,
}

/// Mock implementation of the Converter trait.
///
/// Provides controllable behavior for testing:
/// - Track conversion jobs for assertions
/// - Simulate success and the engine's failure modes
/// - Delay conversions to keep a transcoder busy
///
/// # Example
///
/// ```rust,ignore
/// use grinder_core::testing::{ConversionBehavior, MockConverter};
///
/// let converter = MockConverter::new();
/// converter.set_behavior(ConversionBehavior::Fail).await;
///
/// // ... run a transcoder with `Arc::new(converter.clone())`
///
/// assert_eq!(converter.conversions().await.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct MockConverter {
    conversions: Arc<RwLock<Vec<ConversionJob>>>,
    behavior: Arc<RwLock<ConversionBehavior>>,
    delay: Arc<RwLock<Duration>>,
    extension: String,
}

impl Default for MockConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConverter {
    pub fn new() -> Self {
        Self {
            conversions: Arc::new(RwLock::new(Vec::new())),
            behavior: Arc::new(RwLock::new(ConversionBehavior::Succeed)),
            delay: Arc::new(RwLock::new(Duration::ZERO)),
            extension: "mkv".to_string(),
        }
    }

    pub async fn set_behavior(&self, behavior: ConversionBehavior) {
        *self.behavior.write().await = behavior;
    }

    /// Simulated conversion time.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = delay;
    }

    /// Jobs submitted so far.
    pub async fn conversions(&self) -> Vec<ConversionJob> {
        self.conversions.read().await.clone()
    }
}

#[async_trait]
impl Converter for MockConverter {
    fn name(&self) -> &str {
        "mock"
    }

    fn output_extension(&self) -> &str {
        &self.extension
    }

    async fn convert(&self, job: ConversionJob) -> Result<ConversionResult, ConverterError> {
        self.conversions.write().await.push(job.clone());

        let delay = *self.delay.read().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match *self.behavior.read().await {
            ConversionBehavior::Succeed => {}
            ConversionBehavior::Fail => {
                return Err(ConverterError::conversion_failed(
                    "mock engine failure",
                    Some(1),
                    None,
                ))
            }
            ConversionBehavior::Interrupt => return Err(ConverterError::Interrupted),
            ConversionBehavior::MissingInput => {
                return Err(ConverterError::InputNotFound {
                    path: job.input_path,
                })
            }
            ConversionBehavior::Panic => panic!("mock converter panic"),
        }

        let content = b"mock transcoded output";
        tokio::fs::write(&job.output_path, content).await?;

        Ok(ConversionResult {
            job_id: job.job_id,
            output_path: job.output_path,
            output_size_bytes: content.len() as u64,
            duration_ms: delay.as_millis() as u64,
        })
    }

    async fn validate(&self) -> Result<(), ConverterError> {
        Ok(())
    }
}
