use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::warn;

use super::AuditEvent;
use crate::metrics;

/// An event stamped at emission time, on its way to the writer.
#[derive(Debug, Clone)]
pub struct AuditEventEnvelope {
    pub timestamp: DateTime<Utc>,
    pub event: AuditEvent,
}

/// Cloneable sender side of the audit trail.
///
/// Workers and the orchestrator each hold a clone. Emitting never fails the
/// caller: a closed channel counts the event as dropped and moves on.
#[derive(Clone)]
pub struct AuditHandle {
    tx: mpsc::Sender<AuditEventEnvelope>,
}

impl AuditHandle {
    pub fn new(tx: mpsc::Sender<AuditEventEnvelope>) -> Self {
        Self { tx }
    }

    /// Queues `event`, waiting while the writer is behind.
    pub async fn emit(&self, event: AuditEvent) {
        let event_type = event.event_type();
        let envelope = AuditEventEnvelope {
            timestamp: Utc::now(),
            event,
        };
        if self.tx.send(envelope).await.is_err() {
            metrics::AUDIT_EVENTS.with_label_values(&["dropped"]).inc();
            warn!(event_type, "Audit writer gone, event dropped");
        }
    }

    /// True once the writer has stopped receiving.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zombified(id: usize) -> AuditEvent {
        AuditEvent::WorkerZombified {
            role: "monitor".to_string(),
            worker_id: id,
            reason: Some("library unreachable".to_string()),
        }
    }

    #[tokio::test]
    async fn test_emit_stamps_event() {
        let (tx, mut rx) = mpsc::channel(4);
        let handle = AuditHandle::new(tx);

        let before = Utc::now();
        handle.emit(zombified(0)).await;

        let envelope = rx.recv().await.unwrap();
        assert!(envelope.timestamp >= before);
        assert!(matches!(
            envelope.event,
            AuditEvent::WorkerZombified { worker_id: 0, .. }
        ));
    }

    #[tokio::test]
    async fn test_clones_share_one_channel_in_order() {
        let (tx, mut rx) = mpsc::channel(4);
        let orchestrator = AuditHandle::new(tx);
        let organizer = orchestrator.clone();

        orchestrator.emit(zombified(1)).await;
        organizer.emit(zombified(2)).await;

        for expected in [1, 2] {
            match rx.recv().await.unwrap().event {
                AuditEvent::WorkerZombified { worker_id, .. } => assert_eq!(worker_id, expected),
                other => panic!("unexpected event {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_closed_channel_counts_drop() {
        let (tx, rx) = mpsc::channel(4);
        let handle = AuditHandle::new(tx);
        drop(rx);
        assert!(handle.is_closed());

        let dropped = metrics::AUDIT_EVENTS.with_label_values(&["dropped"]);
        let before = dropped.get();
        handle.emit(zombified(3)).await;
        assert!(dropped.get() > before);
    }
}
