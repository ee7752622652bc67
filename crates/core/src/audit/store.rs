use chrono::{DateTime, Utc};
use thiserror::Error;

use super::AuditRecord;

/// Page size when a query does not ask for one.
pub const DEFAULT_PAGE_SIZE: i64 = 100;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit storage failed: {0}")]
    Storage(String),

    #[error("audit event does not encode: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("stored audit timestamp is unreadable: {0}")]
    Timestamp(#[from] chrono::ParseError),
}

/// Which audit records a query returns.
///
/// Every criterion is optional and they combine with AND. `limit` and
/// `offset` only apply to [`AuditStore::query`].
///
/// ```rust,ignore
/// let heat = AuditFilter::default()
///     .for_item("1234")
///     .of_type("transcode_finished")
///     .page(20, 0);
/// ```
#[derive(Debug, Clone)]
pub struct AuditFilter {
    pub rating_key: Option<String>,
    pub event_type: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for AuditFilter {
    fn default() -> Self {
        Self {
            rating_key: None,
            event_type: None,
            from: None,
            to: None,
            limit: DEFAULT_PAGE_SIZE,
            offset: 0,
        }
    }
}

impl AuditFilter {
    /// Only events about one library item.
    pub fn for_item(mut self, rating_key: impl Into<String>) -> Self {
        self.rating_key = Some(rating_key.into());
        self
    }

    /// Only one event kind, by its `event_type` tag.
    pub fn of_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn since(mut self, from: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self
    }

    pub fn until(mut self, to: DateTime<Utc>) -> Self {
        self.to = Some(to);
        self
    }

    pub fn page(mut self, limit: i64, offset: i64) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }
}

/// Persistence for the grinder's audit trail.
///
/// Calls are synchronous; the [`AuditWriter`](super::AuditWriter) runs them off the
/// orchestrator's path.
pub trait AuditStore: Send + Sync {
    /// Returns the assigned ID.
    fn insert(&self, record: &AuditRecord) -> Result<i64, AuditError>;

    /// Newest first, paginated by the filter's limit and offset.
    fn query(&self, filter: &AuditFilter) -> Result<Vec<AuditRecord>, AuditError>;

    /// Ignores limit and offset.
    fn count(&self, filter: &AuditFilter) -> Result<i64, AuditError>;

    /// Deletes records older than `cutoff`, returning how many went.
    fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<usize, AuditError>;
}
