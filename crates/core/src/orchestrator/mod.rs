//! The single-owner phase loop.
//!
//! The orchestrator owns every worker and cycles through
//! `Idle → SelfCheck → Queue → Organize`:
//! - **Idle**: collect finished organizes, start a monitor poll
//! - **SelfCheck**: replace zombies, fill the pools
//! - **Queue**: reconcile transcode results, dispatch the next candidate
//! - **Organize**: hand succeeded items to the organizer once nothing else runs

mod config;
mod pool;
mod runner;
mod types;

pub use config::OrchestratorConfig;
pub use pool::WorkerPool;
pub use runner::{Collaborators, Orchestrator};
pub use types::{MonitorStatus, OrchestratorStatus, OrganizerStatus, Phase, TranscoderStatus};
