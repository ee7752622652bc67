//! Types for the orchestrator.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::monitor::{MetricsSnapshot, MonitorState};
use crate::organizer::OrganizerState;
use crate::rules::FailureReason;
use crate::transcoder::TranscoderState;

/// Orchestrator phase. The cycle is `Idle → SelfCheck → Queue → Organize → Idle`,
/// with `Queue` allowed to return to `Idle` directly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    SelfCheck,
    Queue,
    Organize,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::SelfCheck => "self_check",
            Self::Queue => "queue",
            Self::Organize => "organize",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorStatus {
    pub id: usize,
    pub state: MonitorState,
    pub polling: bool,
    pub candidates: usize,
    pub snapshot: MetricsSnapshot,
    /// Why the last admission check refused.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<FailureReason>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscoderStatus {
    pub id: usize,
    pub state: TranscoderState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizerStatus {
    pub id: usize,
    pub state: OrganizerState,
}

/// Current status of the orchestrator, published after every step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    pub phase: Phase,
    /// Steps executed since start.
    pub iterations: u64,
    pub monitors: Vec<MonitorStatus>,
    pub transcoders: Vec<TranscoderStatus>,
    pub organizers: Vec<OrganizerStatus>,
    pub readonly: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_serialization() {
        assert_eq!(
            serde_json::to_string(&Phase::SelfCheck).unwrap(),
            "\"self_check\""
        );
        assert_eq!(Phase::Organize.to_string(), "organize");
        assert_eq!(Phase::default(), Phase::Idle);
    }

    #[test]
    fn test_status_omits_empty_optionals() {
        let status = OrchestratorStatus {
            transcoders: vec![TranscoderStatus {
                id: 0,
                state: TranscoderState::Idle,
                rating_key: None,
            }],
            ..Default::default()
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["phase"], "idle");
        assert!(json["transcoders"][0].get("rating_key").is_none());
    }
}
