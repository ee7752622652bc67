//! Testing utilities and mock implementations.
//!
//! Every external collaborator of the orchestrator has an in-memory mock here,
//! so the whole pipeline can run in tests without Plex, ffmpeg or systemd.
//!
//! # Example
//!
//! ```rust,ignore
//! use grinder_core::testing::{fixtures, MockLibrary, MockHostProbe};
//!
//! let library = MockLibrary::new();
//! library.set_items("1", vec![fixtures::media_item("101", "/data/movies/a.avi")]).await;
//!
//! let host = MockHostProbe::new();
//! host.set_veto(true).await;
//! ```

mod mock_converter;
mod mock_database;
mod mock_host;
mod mock_library;
mod mock_mover;
mod mock_service;
mod recorders;

pub use mock_converter::{ConversionBehavior, MockConverter};
pub use mock_database::{DatabaseFault, MockDatabase};
pub use mock_host::MockHostProbe;
pub use mock_library::MockLibrary;
pub use mock_mover::MockMover;
pub use mock_service::{MockService, ServiceCall};
pub use recorders::{RecordingNotifier, RecordingTerminator};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::Path;

    use crate::config::{load_config_from_str, Config};
    use crate::library::MediaItem;

    /// A movie in section "1" backed by a single file.
    pub fn media_item(rating_key: &str, location: &str) -> MediaItem {
        let title = Path::new(location)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(rating_key)
            .to_string();
        let mut item = MediaItem::new(rating_key, title, "1", vec![location.to_string()]);
        item.container = Some("avi".to_string());
        item.video_codec = Some("mpeg4".to_string());
        item.width = Some(1280);
        item.height = Some(720);
        item.bitrate = Some(4_000);
        item.size = Some(700 * 1024 * 1024);
        item
    }

    /// Minimal valid config: one section, one transcoder, 1 ms loop interval.
    ///
    /// `extra` is appended verbatim, so it can add tables such as
    /// `[[admission.transcode]]` or `[[path_mappings]]`.
    pub fn config(cache_dir: &Path, extra: &str) -> Config {
        let toml = format!(
            r#"
[library]
url = "http://127.0.0.1:32400"
token = "test-token"
sections = ["1"]

[database]
path = "/tmp/library.db"

[transcoder]
cache_dir = "{}"

[orchestrator]
loop_interval_ms = 1

[audit]
enabled = false

[server]
enabled = false
{}
"#,
            cache_dir.display(),
            extra
        );
        match load_config_from_str(&toml) {
            Ok(config) => config,
            Err(e) => panic!("fixture config is invalid: {e}"),
        }
    }
}
