//! Library service abstraction.
//!
//! The library service (Plex) is the source of truth for what media exists and
//! where it lives. The monitor reads sessions, resource statistics and section
//! listings through [`LibraryClient`]; the organizer asks it to rescan the
//! sections it rewrote.
//!
//! Connections are created through a [`LibraryConnector`] so monitors can drop
//! their client while the service is stopped and reconnect afterwards.

mod paths;
mod plex;
mod types;

use std::sync::Arc;

use async_trait::async_trait;

pub use paths::{PathMapper, PathMapping};
pub use plex::{PlexClient, PlexConnector};
pub use types::{
    summarize_resources, weighted_mean, LibraryError, MediaItem, ResourceSample, SessionStats,
};

/// Read access plus rescan control for a media library service.
#[async_trait]
pub trait LibraryClient: Send + Sync {
    /// Returns the name of this client implementation.
    fn name(&self) -> &str;

    /// Current playback and transcode session counts.
    async fn sessions(&self) -> Result<SessionStats, LibraryError>;

    /// Recent resource-utilisation samples, oldest first.
    async fn resources(&self) -> Result<Vec<ResourceSample>, LibraryError>;

    /// Every item of one library section.
    async fn section_items(&self, section: &str) -> Result<Vec<MediaItem>, LibraryError>;

    /// Asks the service to rescan one section.
    async fn refresh_section(&self, section: &str) -> Result<(), LibraryError>;
}

/// Factory for library connections.
#[async_trait]
pub trait LibraryConnector: Send + Sync {
    /// Opens a connection and verifies the service answers.
    async fn connect(&self) -> Result<Arc<dyn LibraryClient>, LibraryError>;
}
