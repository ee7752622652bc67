//! Mock library database for testing.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::database::{DatabaseError, DatabaseSession, LibraryDatabase, PathUpdate};

/// Where the mock database fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DatabaseFault {
    #[default]
    None,
    /// Opening the transaction fails.
    Begin,
    /// The update with this zero-based index fails.
    Update(usize),
    Commit,
}

#[derive(Debug, Default)]
struct State {
    fault: DatabaseFault,
    rows_per_update: usize,
    sessions: usize,
    committed: Vec<PathUpdate>,
}

/// Mock implementation of [`LibraryDatabase`].
///
/// Updates become visible through [`MockDatabase::committed`] only once the
/// session commits, like a real transaction.
#[derive(Debug, Clone)]
pub struct MockDatabase {
    state: Arc<Mutex<State>>,
}

impl Default for MockDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDatabase {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                rows_per_update: 1,
                ..Default::default()
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_fault(&self, fault: DatabaseFault) {
        self.state().fault = fault;
    }

    /// Row count every update reports.
    pub fn set_rows_per_update(&self, rows: usize) {
        self.state().rows_per_update = rows;
    }

    /// Updates of every committed session, in order.
    pub fn committed(&self) -> Vec<PathUpdate> {
        self.state().committed.clone()
    }

    /// Number of sessions opened.
    pub fn session_count(&self) -> usize {
        self.state().sessions
    }
}

impl LibraryDatabase for MockDatabase {
    fn begin(&self) -> Result<Box<dyn DatabaseSession>, DatabaseError> {
        let mut state = self.state();
        if state.fault == DatabaseFault::Begin {
            return Err(DatabaseError::Open("mock open failure".to_string()));
        }
        state.sessions += 1;
        Ok(Box::new(MockSession {
            db: self.clone(),
            pending: Vec::new(),
        }))
    }
}

struct MockSession {
    db: MockDatabase,
    pending: Vec<PathUpdate>,
}

impl DatabaseSession for MockSession {
    fn execute_update(&mut self, update: &PathUpdate) -> Result<usize, DatabaseError> {
        let state = self.db.state();
        if state.fault == DatabaseFault::Update(self.pending.len()) {
            return Err(DatabaseError::Statement("mock update failure".to_string()));
        }
        let rows = state.rows_per_update;
        drop(state);
        self.pending.push(update.clone());
        Ok(rows)
    }

    fn commit(self: Box<Self>) -> Result<(), DatabaseError> {
        let mut state = self.db.state();
        if state.fault == DatabaseFault::Commit {
            return Err(DatabaseError::Commit("mock commit failure".to_string()));
        }
        state.committed.extend(self.pending);
        Ok(())
    }
}
