//! Orchestrator configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the phase loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Sleep between two loop iterations (milliseconds).
    #[serde(default = "default_loop_interval")]
    pub loop_interval_ms: u64,

    /// Transcoder result codes that mark an item as failed.
    /// Any other non-zero code leaves the item discovered so it is retried.
    #[serde(default = "default_failed_codes")]
    pub failed_codes: Vec<i32>,
}

fn default_loop_interval() -> u64 {
    1000
}

fn default_failed_codes() -> Vec<i32> {
    vec![405, 500]
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            loop_interval_ms: default_loop_interval(),
            failed_codes: default_failed_codes(),
        }
    }
}

impl OrchestratorConfig {
    pub fn is_failure(&self, code: i32) -> bool {
        self.failed_codes.contains(&code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.loop_interval_ms, 1000);
        assert!(config.is_failure(405));
        assert!(config.is_failure(500));
        assert!(!config.is_failure(404));
        assert!(!config.is_failure(255));
    }

    #[test]
    fn test_deserialize_full() {
        let toml = r#"
            loop_interval_ms = 250
            failed_codes = [404, 405, 500]
        "#;
        let config: OrchestratorConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.loop_interval_ms, 250);
        assert!(config.is_failure(404));
    }
}
