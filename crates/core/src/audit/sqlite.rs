use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use super::{AuditError, AuditEvent, AuditFilter, AuditRecord, AuditStore};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS audit_events (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        event_type TEXT NOT NULL,
        rating_key TEXT,
        data TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_audit_events_timestamp ON audit_events(timestamp);
    CREATE INDEX IF NOT EXISTS idx_audit_events_rating_key ON audit_events(rating_key);
    CREATE INDEX IF NOT EXISTS idx_audit_events_event_type ON audit_events(event_type);
"#;

/// SQLite-backed audit store
pub struct SqliteAuditStore {
    conn: Mutex<Connection>,
}

impl SqliteAuditStore {
    /// Opens (creating if needed) the audit database at `path`.
    pub fn new(path: &Path) -> Result<Self, AuditError> {
        let conn = Connection::open(path).map_err(|e| AuditError::Storage(e.to_string()))?;
        Self::with_connection(conn)
    }

    /// Create an in-memory SQLite audit store (useful for testing)
    pub fn in_memory() -> Result<Self, AuditError> {
        let conn = Connection::open_in_memory().map_err(|e| AuditError::Storage(e.to_string()))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, AuditError> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| AuditError::Storage(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, AuditError> {
        self.conn
            .lock()
            .map_err(|_| AuditError::Storage("audit connection poisoned".to_string()))
    }

    fn build_where_clause(filter: &AuditFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref rating_key) = filter.rating_key {
            conditions.push("rating_key = ?");
            params.push(Box::new(rating_key.clone()));
        }

        if let Some(ref event_type) = filter.event_type {
            conditions.push("event_type = ?");
            params.push(Box::new(event_type.clone()));
        }

        if let Some(ref from) = filter.from {
            conditions.push("timestamp >= ?");
            params.push(Box::new(from.to_rfc3339()));
        }

        if let Some(ref to) = filter.to {
            conditions.push("timestamp <= ?");
            params.push(Box::new(to.to_rfc3339()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }
}

impl AuditStore for SqliteAuditStore {
    fn insert(&self, record: &AuditRecord) -> Result<i64, AuditError> {
        let data_json = serde_json::to_string(&record.data)?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO audit_events (timestamp, event_type, rating_key, data) VALUES (?, ?, ?, ?)",
            params![
                record.timestamp.to_rfc3339(),
                record.event_type,
                record.rating_key,
                data_json,
            ],
        )
        .map_err(|e| AuditError::Storage(e.to_string()))?;

        Ok(conn.last_insert_rowid())
    }

    fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, AuditError> {
        let conn = self.lock()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!(
            "SELECT id, timestamp, event_type, rating_key, data FROM audit_events {} \
             ORDER BY timestamp DESC, id DESC LIMIT ? OFFSET ?",
            where_clause
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| AuditError::Storage(e.to_string()))?;

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));
        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .map_err(|e| AuditError::Storage(e.to_string()))?;

        let mut records = Vec::new();
        for row in rows {
            let (id, timestamp, event_type, rating_key, data_json) =
                row.map_err(|e| AuditError::Storage(e.to_string()))?;

            let timestamp: DateTime<Utc> = DateTime::parse_from_rfc3339(&timestamp)?.into();
            let data: AuditEvent = serde_json::from_str(&data_json)?;

            records.push(AuditRecord {
                id,
                timestamp,
                event_type,
                rating_key,
                data,
            });
        }

        Ok(records)
    }

    fn count(&self, filter: &AuditFilter) -> Result<i64, AuditError> {
        let conn = self.lock()?;

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM audit_events {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(|e| AuditError::Storage(e.to_string()))
    }

    fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<usize, AuditError> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM audit_events WHERE timestamp < ?",
            params![cutoff.to_rfc3339()],
        )
        .map_err(|e| AuditError::Storage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::TranscodeDisposition;
    use chrono::Duration;

    fn record(event: AuditEvent) -> AuditRecord {
        AuditRecord::new(Utc::now(), event)
    }

    fn started() -> AuditRecord {
        record(AuditEvent::ServiceStarted {
            version: "0.1.0".to_string(),
            config_hash: "abc123".to_string(),
        })
    }

    fn finished(key: &str, code: i32) -> AuditRecord {
        record(AuditEvent::TranscodeFinished {
            rating_key: key.to_string(),
            code,
            duration_ms: 1000,
            disposition: if code == 0 {
                TranscodeDisposition::Succeeded
            } else {
                TranscodeDisposition::Failed
            },
        })
    }

    #[test]
    fn test_insert_and_query() {
        let store = SqliteAuditStore::in_memory().unwrap();
        let id = store.insert(&started()).unwrap();
        assert!(id > 0);

        let results = store.query(&AuditFilter::default()).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, id);
        assert_eq!(results[0].event_type, "service_started");
        assert!(matches!(results[0].data, AuditEvent::ServiceStarted { .. }));
    }

    #[test]
    fn test_query_by_event_type_and_rating_key() {
        let store = SqliteAuditStore::in_memory().unwrap();
        store.insert(&started()).unwrap();
        store.insert(&finished("1", 0)).unwrap();
        store.insert(&finished("2", 500)).unwrap();
        store.insert(&finished("1", 0)).unwrap();

        let by_type = AuditFilter::default().of_type("transcode_finished");
        assert_eq!(store.query(&by_type).unwrap().len(), 3);

        let by_key = AuditFilter::default().for_item("1");
        let results = store.query(&by_key).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.rating_key.as_deref() == Some("1")));
    }

    #[test]
    fn test_query_since_cutoff() {
        let store = SqliteAuditStore::in_memory().unwrap();
        let now = Utc::now();

        let mut old = started();
        old.timestamp = now - Duration::hours(2);
        store.insert(&old).unwrap();
        let mut recent = started();
        recent.timestamp = now;
        store.insert(&recent).unwrap();

        let filter = AuditFilter::default().since(now - Duration::hours(1));
        assert_eq!(store.query(&filter).unwrap().len(), 1);
    }

    #[test]
    fn test_pagination_and_count() {
        let store = SqliteAuditStore::in_memory().unwrap();
        for i in 0..5 {
            store.insert(&finished(&i.to_string(), 0)).unwrap();
        }

        let page = |offset| {
            store
                .query(&AuditFilter::default().page(2, offset))
                .unwrap()
                .len()
        };
        assert_eq!(page(0), 2);
        assert_eq!(page(2), 2);
        assert_eq!(page(4), 1);
        assert_eq!(store.count(&AuditFilter::default()).unwrap(), 5);
        assert_eq!(
            store
                .count(&AuditFilter::default().of_type("service_started"))
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_purge_before_keeps_recent_records() {
        let store = SqliteAuditStore::in_memory().unwrap();
        let now = Utc::now();

        for age in [30, 10, 0] {
            let mut rec = finished("1", 0);
            rec.timestamp = now - Duration::days(age);
            store.insert(&rec).unwrap();
        }

        let purged = store.purge_before(now - Duration::days(7)).unwrap();
        assert_eq!(purged, 2);
        assert_eq!(store.count(&AuditFilter::default()).unwrap(), 1);
        assert_eq!(store.purge_before(now - Duration::days(7)).unwrap(), 0);
    }

    #[test]
    fn test_file_based_store() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("audit.db");

        let store = SqliteAuditStore::new(&db_path).unwrap();
        store.insert(&started()).unwrap();
        assert!(db_path.exists());
        drop(store);

        let reopened = SqliteAuditStore::new(&db_path).unwrap();
        assert_eq!(reopened.count(&AuditFilter::default()).unwrap(), 1);
    }
}
