//! Organizer worker: moves transcoded files back into the library.
//!
//! A run has two passes. The match pass reads the cache and builds a
//! [`PendingTransaction`] without touching anything. The commit pass then:
//!
//! 1. stops the library service,
//! 2. applies every database update inside one transaction,
//! 3. moves the outputs next to the originals,
//! 4. deletes originals that were replaced under a new name,
//! 5. commits the database transaction,
//! 6. starts the library service again,
//! 7. asks the library to rescan the touched sections, inside the rescan window.
//!
//! A failure in steps 2 to 5 leaves the library in an unknown state. The
//! [`FatalHandler`] is invoked and the service is not restarted.

mod fatal;
mod transaction;
mod worker;

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::service::ServiceError;

pub use fatal::{FatalHandler, ProcessTerminator, FATAL_EXIT_CODE};
pub use transaction::{plan, FileMove, PendingTransaction};
pub use worker::{OrganizeReport, Organizer, OrganizerDeps, OrganizerState};

/// The commit sub-steps guarded by the fatal handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitStep {
    Update,
    Move,
    Delete,
    Commit,
}

impl fmt::Display for CommitStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Update => "update",
            Self::Move => "move",
            Self::Delete => "delete",
            Self::Commit => "commit",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum OrganizeError {
    #[error("cannot read transcode cache: {0}")]
    CacheScan(#[source] std::io::Error),

    #[error("failed to stop library service: {0}")]
    ServiceStop(#[source] ServiceError),

    /// The transaction committed before the start failed; `report` holds it.
    #[error("failed to start library service: {source}")]
    ServiceStart {
        #[source]
        source: ServiceError,
        report: Box<OrganizeReport>,
    },

    #[error("library transaction aborted at {step}: {reason}")]
    Commit { step: CommitStep, reason: String },

    #[error("organize task panicked: {0}")]
    TaskPanicked(String),
}
