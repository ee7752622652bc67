//! Mock service control for testing.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::service::{ServiceControl, ServiceError};

/// A call made on [`MockService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceCall {
    Stop,
    Start,
}

/// Mock implementation of [`ServiceControl`] that records every call.
#[derive(Debug, Clone, Default)]
pub struct MockService {
    calls: Arc<RwLock<Vec<ServiceCall>>>,
    fail_stop: Arc<RwLock<bool>>,
    fail_start: Arc<RwLock<bool>>,
}

impl MockService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn calls(&self) -> Vec<ServiceCall> {
        self.calls.read().await.clone()
    }

    pub async fn fail_stop(&self, fail: bool) {
        *self.fail_stop.write().await = fail;
    }

    pub async fn fail_start(&self, fail: bool) {
        *self.fail_start.write().await = fail;
    }

    async fn record(&self, call: ServiceCall, fail: bool) -> Result<(), ServiceError> {
        self.calls.write().await.push(call);
        if fail {
            return Err(ServiceError::CommandFailed {
                command: format!("mock {:?}", call).to_lowercase(),
                code: Some(1),
                stderr: "mock failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ServiceControl for MockService {
    async fn stop(&self) -> Result<(), ServiceError> {
        let fail = *self.fail_stop.read().await;
        self.record(ServiceCall::Stop, fail).await
    }

    async fn start(&self) -> Result<(), ServiceError> {
        let fail = *self.fail_start.read().await;
        self.record(ServiceCall::Start, fail).await
    }
}
