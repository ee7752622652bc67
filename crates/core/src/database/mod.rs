//! Direct access to the library service's database.
//!
//! The organizer rewrites file paths of transcoded items while the service is
//! stopped. Each organizer run opens one [`DatabaseSession`]; every update of
//! the run goes into its single transaction.

mod sqlite;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use sqlite::SqliteLibraryDatabase;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("failed to open library database: {0}")]
    Open(String),

    #[error("library database statement failed: {0}")]
    Statement(String),

    #[error("library database commit failed: {0}")]
    Commit(String),
}

/// Repoints one item's file from `old_path` to `new_path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathUpdate {
    pub rating_key: String,
    pub old_path: String,
    pub new_path: String,
}

/// Opens transactional sessions on the library database.
pub trait LibraryDatabase: Send + Sync {
    fn begin(&self) -> Result<Box<dyn DatabaseSession>, DatabaseError>;
}

/// An open transaction. Dropping it without `commit` discards every update.
pub trait DatabaseSession: Send {
    /// Applies the update and returns the number of rows it touched.
    fn execute_update(&mut self, update: &PathUpdate) -> Result<usize, DatabaseError>;

    fn commit(self: Box<Self>) -> Result<(), DatabaseError>;
}
