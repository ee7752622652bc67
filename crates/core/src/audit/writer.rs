use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info};

use super::{AuditEventEnvelope, AuditHandle, AuditRecord, AuditStore};
use crate::metrics;

/// Drains the audit channel into an [`AuditStore`].
pub struct AuditWriter {
    rx: mpsc::Receiver<AuditEventEnvelope>,
    store: Arc<dyn AuditStore>,
}

impl AuditWriter {
    pub fn new(rx: mpsc::Receiver<AuditEventEnvelope>, store: Arc<dyn AuditStore>) -> Self {
        Self { rx, store }
    }

    /// Runs until every [`AuditHandle`] is dropped. Store failures are logged
    /// and counted, never retried.
    pub async fn run(mut self) {
        info!("Audit writer started");
        let mut written = 0u64;

        while let Some(envelope) = self.rx.recv().await {
            let record = AuditRecord::new(envelope.timestamp, envelope.event);
            match self.store.insert(&record) {
                Ok(_) => {
                    written += 1;
                    metrics::AUDIT_EVENTS.with_label_values(&["written"]).inc();
                }
                Err(e) => {
                    metrics::AUDIT_EVENTS.with_label_values(&["failed"]).inc();
                    error!(event_type = %record.event_type, error = %e, "Failed to write audit event");
                }
            }
        }

        info!(written, "Audit writer stopped");
    }
}

/// Wires a handle to a writer over a channel of `capacity` events.
///
/// Spawn the writer with `tokio::spawn(writer.run())` and clone the handle
/// into whatever emits events.
pub fn create_audit_system(
    store: Arc<dyn AuditStore>,
    capacity: usize,
) -> (AuditHandle, AuditWriter) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (AuditHandle::new(tx), AuditWriter::new(rx, store))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::audit::{AuditError, AuditEvent, AuditFilter, TranscodeDisposition};

    /// Mock store that records insert calls
    struct MockStore {
        records: Mutex<Vec<AuditRecord>>,
        should_fail: bool,
    }

    impl MockStore {
        fn new() -> Self {
            Self {
                records: Mutex::new(Vec::new()),
                should_fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                records: Mutex::new(Vec::new()),
                should_fail: true,
            }
        }

        fn get_records(&self) -> Vec<AuditRecord> {
            self.records.lock().unwrap().clone()
        }
    }

    impl AuditStore for MockStore {
        fn insert(&self, record: &AuditRecord) -> Result<i64, AuditError> {
            if self.should_fail {
                return Err(AuditError::Storage("Mock failure".to_string()));
            }
            let mut records = self.records.lock().unwrap();
            let id = records.len() as i64 + 1;
            let mut stored = record.clone();
            stored.id = id;
            records.push(stored);
            Ok(id)
        }

        fn query(&self, _filter: &AuditFilter) -> Result<Vec<AuditRecord>, AuditError> {
            Ok(self.records.lock().unwrap().clone())
        }

        fn count(&self, _filter: &AuditFilter) -> Result<i64, AuditError> {
            Ok(self.records.lock().unwrap().len() as i64)
        }

        fn purge_before(&self, cutoff: chrono::DateTime<chrono::Utc>) -> Result<usize, AuditError> {
            let mut records = self.records.lock().unwrap();
            let before = records.len();
            records.retain(|r| r.timestamp >= cutoff);
            Ok(before - records.len())
        }
    }

    fn spawn_with(store: &Arc<MockStore>) -> (AuditHandle, tokio::task::JoinHandle<()>) {
        let store_dyn: Arc<dyn AuditStore> = Arc::clone(store) as Arc<dyn AuditStore>;
        let (handle, writer) = create_audit_system(store_dyn, 10);
        (handle, tokio::spawn(writer.run()))
    }

    fn finished(key: &str) -> AuditEvent {
        AuditEvent::TranscodeFinished {
            rating_key: key.to_string(),
            code: 0,
            duration_ms: 5,
            disposition: TranscodeDisposition::Succeeded,
        }
    }

    #[tokio::test]
    async fn test_writer_stores_events_and_extracts_rating_key() {
        let store = Arc::new(MockStore::new());
        let (handle, writer) = spawn_with(&store);

        handle
            .emit(AuditEvent::ServiceStarted {
                version: "0.1.0".to_string(),
                config_hash: "abc123".to_string(),
            })
            .await;
        handle.emit(finished("42")).await;
        drop(handle);
        writer.await.unwrap();

        let records = store.get_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].event_type, "service_started");
        assert_eq!(records[0].rating_key, None);
        assert_eq!(records[1].rating_key.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn test_writer_continues_on_insert_failure() {
        let store = Arc::new(MockStore::failing());
        let (handle, writer) = spawn_with(&store);

        let failed = metrics::AUDIT_EVENTS.with_label_values(&["failed"]);
        let before = failed.get();

        handle.emit(finished("1")).await;
        handle.emit(finished("2")).await;
        drop(handle);

        writer.await.unwrap();
        assert!(store.get_records().is_empty());
        assert!(failed.get() >= before + 2);
    }

    #[tokio::test]
    async fn test_writer_waits_for_all_handles_to_drop() {
        let store = Arc::new(MockStore::new());
        let (main_handle, writer) = spawn_with(&store);
        let orchestrator_handle = main_handle.clone();

        orchestrator_handle.emit(finished("1")).await;
        main_handle
            .emit(AuditEvent::ServiceStopped {
                reason: "graceful_shutdown".to_string(),
            })
            .await;
        drop(main_handle);

        tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
        assert!(
            !writer.is_finished(),
            "Writer should still be running with handles alive"
        );

        drop(orchestrator_handle);
        let result = tokio::time::timeout(tokio::time::Duration::from_secs(1), writer).await;
        assert!(result.is_ok(), "Writer should exit after all handles dropped");

        let records = store.get_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].event_type, "service_stopped");
    }
}
