use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happened to a reaped transcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscodeDisposition {
    Succeeded,
    Failed,
    /// Back to discovered; dispatched again on a later pass.
    Retry,
}

/// Audit events emitted by the orchestrator and its workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// Service started.
    ServiceStarted {
        /// Application version
        version: String,
        /// Hash of the loaded configuration
        config_hash: String,
    },

    /// Service stopped.
    ServiceStopped {
        /// Reason for stopping
        reason: String,
    },

    /// An item was marked in flight and handed to a transcoder.
    TranscodeDispatched {
        rating_key: String,
        title: String,
        transcoder: usize,
    },

    /// A transcode result was reconciled into the history.
    TranscodeFinished {
        rating_key: String,
        code: i32,
        duration_ms: u64,
        disposition: TranscodeDisposition,
    },

    /// The organizer took over the succeeded set.
    OrganizeStarted {
        organizer: usize,
        items: usize,
    },

    /// The commit protocol completed.
    TransactionCommitted {
        /// Rating keys whose files were moved into the library
        committed: Vec<String>,
        moved: usize,
        deleted: usize,
        updated: usize,
        /// Updates that touched a row count other than one
        mismatched_rows: usize,
    },

    /// A commit step failed and the fatal handler was invoked.
    TransactionAborted {
        /// Commit step that failed (`update`, `move`, `delete`, `commit`)
        step: String,
        reason: String,
    },

    /// The organizer result was reaped.
    OrganizeFinished {
        organizer: usize,
        committed: usize,
        /// Succeeded items with no output left in the cache
        stale: usize,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        rescanned: Vec<String>,
        readonly: bool,
    },

    /// A worker failed fatally and will be replaced.
    WorkerZombified {
        role: String,
        worker_id: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl AuditEvent {
    /// Returns the event type as a string for storage
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ServiceStarted { .. } => "service_started",
            Self::ServiceStopped { .. } => "service_stopped",
            Self::TranscodeDispatched { .. } => "transcode_dispatched",
            Self::TranscodeFinished { .. } => "transcode_finished",
            Self::OrganizeStarted { .. } => "organize_started",
            Self::TransactionCommitted { .. } => "transaction_committed",
            Self::TransactionAborted { .. } => "transaction_aborted",
            Self::OrganizeFinished { .. } => "organize_finished",
            Self::WorkerZombified { .. } => "worker_zombified",
        }
    }

    /// Extract the rating key if this event concerns a single item
    pub fn rating_key(&self) -> Option<&str> {
        match self {
            Self::TranscodeDispatched { rating_key, .. }
            | Self::TranscodeFinished { rating_key, .. } => Some(rating_key),
            _ => None,
        }
    }
}

/// A stored audit record with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub rating_key: Option<String>,
    pub data: AuditEvent,
}

impl AuditRecord {
    /// An unsaved record; the store assigns the id.
    pub fn new(timestamp: DateTime<Utc>, event: AuditEvent) -> Self {
        Self {
            id: 0,
            timestamp,
            event_type: event.event_type().to_string(),
            rating_key: event.rating_key().map(String::from),
            data: event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_service_started() {
        let event = AuditEvent::ServiceStarted {
            version: "0.1.0".to_string(),
            config_hash: "abc123".to_string(),
        };
        assert_eq!(event.event_type(), "service_started");
        assert_eq!(event.rating_key(), None);
    }

    #[test]
    fn test_transcode_events_carry_rating_key() {
        let event = AuditEvent::TranscodeFinished {
            rating_key: "42".to_string(),
            code: 404,
            duration_ms: 10,
            disposition: TranscodeDisposition::Retry,
        };
        assert_eq!(event.event_type(), "transcode_finished");
        assert_eq!(event.rating_key(), Some("42"));
    }

    #[test]
    fn test_serialization_uses_type_tag() {
        let event = AuditEvent::TransactionAborted {
            step: "move".to_string(),
            reason: "disk full".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "transaction_aborted");
        assert_eq!(json["step"], "move");

        let parsed: AuditEvent = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.event_type(), "transaction_aborted");
    }

    #[test]
    fn test_record_indexes_event() {
        let now = Utc::now();
        let record = AuditRecord::new(
            now,
            AuditEvent::TranscodeDispatched {
                rating_key: "7".to_string(),
                title: "Alien".to_string(),
                transcoder: 1,
            },
        );
        assert_eq!(record.id, 0);
        assert_eq!(record.timestamp, now);
        assert_eq!(record.event_type, "transcode_dispatched");
        assert_eq!(record.rating_key.as_deref(), Some("7"));
    }

    #[test]
    fn test_optional_fields_omitted() {
        let event = AuditEvent::WorkerZombified {
            role: "monitor".to_string(),
            worker_id: 0,
            reason: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("reason"));
    }
}
