//! Recording sinks for testing.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::notify::{Notification, Notifier};
use crate::organizer::FatalHandler;

/// Keeps every notification it receives.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    received: Arc<RwLock<Vec<Notification>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.received.read().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    async fn notify(&self, notification: &Notification) {
        self.received.write().await.push(notification.clone());
    }
}

/// Fatal handler that records the reason instead of exiting.
#[derive(Debug, Clone, Default)]
pub struct RecordingTerminator {
    reasons: Arc<RwLock<Vec<String>>>,
}

impl RecordingTerminator {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn reasons(&self) -> Vec<String> {
        self.reasons.read().await.clone()
    }

    pub async fn was_invoked(&self) -> bool {
        !self.reasons.read().await.is_empty()
    }
}

#[async_trait]
impl FatalHandler for RecordingTerminator {
    async fn terminate(&self, reason: &str) {
        self.reasons.write().await.push(reason.to_string());
    }
}
