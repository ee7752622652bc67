use std::sync::Arc;

use tokio::sync::watch;
use grinder_core::{AuditStore, Config, OrchestratorStatus, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    audit_store: Option<Arc<dyn AuditStore>>,
    status: watch::Receiver<OrchestratorStatus>,
}

impl AppState {
    pub fn new(
        config: Config,
        audit_store: Option<Arc<dyn AuditStore>>,
        status: watch::Receiver<OrchestratorStatus>,
    ) -> Self {
        Self {
            config,
            audit_store,
            status,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    /// `None` when auditing is disabled.
    pub fn audit_store(&self) -> Option<&dyn AuditStore> {
        self.audit_store.as_deref()
    }

    /// Latest status published by the orchestrator.
    pub fn status(&self) -> OrchestratorStatus {
        self.status.borrow().clone()
    }
}
