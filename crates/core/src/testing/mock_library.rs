//! Mock library service for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::library::{
    LibraryClient, LibraryConnector, LibraryError, MediaItem, ResourceSample, SessionStats,
};

/// Mock implementation of both [`LibraryConnector`] and [`LibraryClient`].
///
/// Clones share state, so a test keeps one handle for configuration and
/// assertions while the code under test owns another.
///
/// # Example
///
/// ```rust,ignore
/// use grinder_core::testing::MockLibrary;
///
/// let library = MockLibrary::new();
/// library.set_items("1", vec![MediaItem::new("10", "Film", "1", vec!["/data/film.avi".into()])]).await;
///
/// let connector: Arc<dyn LibraryConnector> = Arc::new(library.clone());
/// // ...
/// assert_eq!(library.refreshed_sections().await, vec!["1"]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockLibrary {
    /// Items per section id.
    sections: Arc<RwLock<HashMap<String, Vec<MediaItem>>>>,
    sessions: Arc<RwLock<SessionStats>>,
    resources: Arc<RwLock<Vec<ResourceSample>>>,
    fail_listing: Arc<RwLock<bool>>,
    fail_connect: Arc<RwLock<bool>>,
    fail_refresh: Arc<RwLock<bool>>,
    connects: Arc<RwLock<usize>>,
    /// Sections passed to `refresh_section`, in call order.
    refreshed: Arc<RwLock<Vec<String>>>,
}

impl MockLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the listing of one section.
    pub async fn set_items(&self, section: &str, items: Vec<MediaItem>) {
        self.sections
            .write()
            .await
            .insert(section.to_string(), items);
    }

    /// Make section listings fail with an API error.
    pub async fn fail_listing(&self, fail: bool) {
        *self.fail_listing.write().await = fail;
    }

    /// Make `connect` fail with a connection error.
    pub async fn fail_connect(&self, fail: bool) {
        *self.fail_connect.write().await = fail;
    }

    /// Make `refresh_section` fail.
    pub async fn fail_refresh(&self, fail: bool) {
        *self.fail_refresh.write().await = fail;
    }

    pub async fn set_sessions(&self, playing: u32, transcode: u32) {
        *self.sessions.write().await = SessionStats {
            playing_sessions: playing,
            transcode_sessions: transcode,
        };
    }

    pub async fn set_resources(&self, samples: Vec<ResourceSample>) {
        *self.resources.write().await = samples;
    }

    /// Number of successful `connect` calls.
    pub async fn connect_count(&self) -> usize {
        *self.connects.read().await
    }

    pub async fn refreshed_sections(&self) -> Vec<String> {
        self.refreshed.read().await.clone()
    }
}

#[async_trait]
impl LibraryConnector for MockLibrary {
    async fn connect(&self) -> Result<Arc<dyn LibraryClient>, LibraryError> {
        if *self.fail_connect.read().await {
            return Err(LibraryError::ConnectionFailed("mock connect failure".to_string()));
        }
        *self.connects.write().await += 1;
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl LibraryClient for MockLibrary {
    fn name(&self) -> &str {
        "mock"
    }

    async fn sessions(&self) -> Result<SessionStats, LibraryError> {
        Ok(*self.sessions.read().await)
    }

    async fn resources(&self) -> Result<Vec<ResourceSample>, LibraryError> {
        Ok(self.resources.read().await.clone())
    }

    async fn section_items(&self, section: &str) -> Result<Vec<MediaItem>, LibraryError> {
        if *self.fail_listing.read().await {
            return Err(LibraryError::ApiError("mock listing failure".to_string()));
        }
        Ok(self
            .sections
            .read()
            .await
            .get(section)
            .cloned()
            .unwrap_or_default())
    }

    async fn refresh_section(&self, section: &str) -> Result<(), LibraryError> {
        if *self.fail_refresh.read().await {
            return Err(LibraryError::ApiError("mock refresh failure".to_string()));
        }
        self.refreshed.write().await.push(section.to_string());
        Ok(())
    }
}
