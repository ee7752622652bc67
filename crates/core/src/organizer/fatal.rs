use std::time::Duration;

use async_trait::async_trait;
use tracing::error;

/// Exit status used when a library transaction cannot be completed.
pub const FATAL_EXIT_CODE: i32 = 70;

/// Invoked when a commit step fails after the library service was stopped.
///
/// The library database and filesystem may disagree at that point, so the
/// service must stay down until an operator looks at it.
#[async_trait]
pub trait FatalHandler: Send + Sync {
    async fn terminate(&self, reason: &str);
}

/// Terminates the process after a short grace period for log and audit sinks.
pub struct ProcessTerminator {
    grace: Duration,
}

impl ProcessTerminator {
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }
}

impl Default for ProcessTerminator {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

#[async_trait]
impl FatalHandler for ProcessTerminator {
    async fn terminate(&self, reason: &str) {
        error!(
            reason = %reason,
            exit_code = FATAL_EXIT_CODE,
            "Library transaction failed, terminating without restarting the library service"
        );
        tokio::time::sleep(self.grace).await;
        std::process::exit(FATAL_EXIT_CODE);
    }
}
