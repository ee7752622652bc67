//! Stopping and starting the library service around database writes.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tracing::info;

use crate::config::ServiceConfig;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("service command '{command}' failed with code {code:?}: {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("failed to run service command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Controls the library service process.
#[async_trait]
pub trait ServiceControl: Send + Sync {
    async fn stop(&self) -> Result<(), ServiceError>;

    async fn start(&self) -> Result<(), ServiceError>;
}

/// Runs configured shell commands, then waits for the service to settle.
pub struct ShellServiceControl {
    stop_command: String,
    start_command: String,
    settle: Duration,
}

impl ShellServiceControl {
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            stop_command: config.stop_command.clone(),
            start_command: config.start_command.clone(),
            settle: Duration::from_secs(config.settle_secs),
        }
    }

    async fn run(&self, command: &str) -> Result<(), ServiceError> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .await
            .map_err(|e| ServiceError::Spawn {
                command: command.to_string(),
                source: e,
            })?;

        if !output.status.success() {
            return Err(ServiceError::CommandFailed {
                command: command.to_string(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }
        Ok(())
    }
}

#[async_trait]
impl ServiceControl for ShellServiceControl {
    async fn stop(&self) -> Result<(), ServiceError> {
        info!(command = %self.stop_command, "Stopping library service");
        self.run(&self.stop_command).await
    }

    async fn start(&self) -> Result<(), ServiceError> {
        info!(command = %self.start_command, "Starting library service");
        self.run(&self.start_command).await
    }
}
