//! One-way notifications about organizer activity.
//!
//! Notifiers never fail the caller: delivery errors are logged and dropped.

mod webhook;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub use webhook::WebhookNotifier;

use crate::config::NotifyConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    /// The organizer took over `items` succeeded transcodes.
    OrganizeStarted { items: usize },
    OrganizeFinished {
        committed: usize,
        moved: usize,
        mismatched_rows: usize,
    },
    /// A commit step failed; the process is about to terminate.
    TransactionAborted { reason: String },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> &str;

    async fn notify(&self, notification: &Notification);
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, notification: &Notification) {
        match notification {
            Notification::TransactionAborted { reason } => {
                warn!(reason = %reason, "Notification: transaction aborted")
            }
            other => info!(notification = ?other, "Notification"),
        }
    }
}

/// Builds the configured notifier: a webhook when a URL is set, the log otherwise.
pub fn create_notifier(config: &NotifyConfig) -> Box<dyn Notifier> {
    match &config.webhook_url {
        Some(url) => match WebhookNotifier::new(url, config.timeout_secs) {
            Ok(notifier) => Box::new(notifier),
            Err(e) => {
                warn!(error = %e, "Failed to build webhook notifier, falling back to log");
                Box::new(LogNotifier)
            }
        },
        None => Box::new(LogNotifier),
    }
}
