use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use crate::converter::ConverterConfig;
use crate::library::PathMapping;
use crate::orchestrator::OrchestratorConfig;
use crate::rules::{ItemRule, MetricRule, Rule, TimeWindow};

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub library: LibraryConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    pub transcoder: TranscoderConfig,
    #[serde(default)]
    pub pools: PoolsConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub admission: AdmissionConfig,
    #[serde(default)]
    pub path_mappings: Vec<PathMapping>,
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub server: ServerConfig,
    /// Validate and log, but never transcode, move or write the database.
    #[serde(default)]
    pub readonly: bool,
}

/// Library service (Plex) connection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LibraryConfig {
    pub url: String,
    pub token: String,
    /// Section ids to grind.
    pub sections: Vec<String>,
    /// How often the section listings are fetched again (default: 3600)
    #[serde(default = "default_listing_interval")]
    pub listing_interval_secs: u64,
    /// How often sessions and resource statistics are fetched (default: 60)
    #[serde(default = "default_sessions_interval")]
    pub sessions_interval_secs: u64,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_listing_interval() -> u64 {
    3600
}

fn default_sessions_interval() -> u64 {
    60
}

fn default_timeout() -> u64 {
    30
}

/// The library service's own SQLite database
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

fn default_busy_timeout() -> u64 {
    5000
}

/// Commands that stop and start the library service
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    #[serde(default = "default_stop_command")]
    pub stop_command: String,
    #[serde(default = "default_start_command")]
    pub start_command: String,
    /// Wait after each command before touching the service again.
    #[serde(default = "default_settle")]
    pub settle_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            stop_command: default_stop_command(),
            start_command: default_start_command(),
            settle_secs: default_settle(),
        }
    }
}

fn default_stop_command() -> String {
    "systemctl stop plexmediaserver".to_string()
}

fn default_start_command() -> String {
    "systemctl start plexmediaserver".to_string()
}

fn default_settle() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TranscoderConfig {
    /// Per-item output directories are created below this one.
    pub cache_dir: PathBuf,
    #[serde(default)]
    pub engine: ConverterConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PoolsConfig {
    #[serde(default = "default_transcoders")]
    pub transcoders: usize,
}

impl Default for PoolsConfig {
    fn default() -> Self {
        Self {
            transcoders: default_transcoders(),
        }
    }
}

fn default_transcoders() -> usize {
    1
}

/// Rule sets gating each transition
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AdmissionConfig {
    #[serde(default)]
    pub transcode: Vec<Rule>,
    #[serde(default)]
    pub organize: Vec<Rule>,
    /// Any matching rule means the cache is full.
    #[serde(default)]
    pub capacity: Vec<MetricRule>,
    /// Every rule must hold for an item to become a candidate.
    #[serde(default)]
    pub item_filter: Vec<ItemRule>,
    /// Rescans only happen inside these windows.
    #[serde(default = "default_rescan_windows")]
    pub rescan_windows: Vec<TimeWindow>,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            transcode: Vec::new(),
            organize: Vec::new(),
            capacity: Vec::new(),
            item_filter: Vec::new(),
            rescan_windows: default_rescan_windows(),
        }
    }
}

fn default_rescan_windows() -> Vec<TimeWindow> {
    vec![TimeWindow::new(chrono::NaiveTime::MIN, chrono::NaiveTime::MIN)]
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HostConfig {
    /// Path whose disk is reported as storage (default: the cache dir).
    #[serde(default)]
    pub disk_path: Option<PathBuf>,
    /// `nvidia-smi` binary; GPU metrics stay zero when unset.
    #[serde(default)]
    pub nvidia_smi: Option<String>,
    /// While this file exists the veto flag is raised.
    #[serde(default)]
    pub veto_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuditConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_audit_path")]
    pub path: PathBuf,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    /// Records older than this are purged at startup. Unset keeps everything.
    #[serde(default)]
    pub retention_days: Option<u32>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_audit_path(),
            channel_capacity: default_channel_capacity(),
            retention_days: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_audit_path() -> PathBuf {
    PathBuf::from("grinder-audit.db")
}

fn default_channel_capacity() -> usize {
    1000
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct NotifyConfig {
    /// JSON notifications are POSTed here; log-only when unset.
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_notify_timeout")]
    pub timeout_secs: u64,
}

fn default_notify_timeout() -> u64 {
    10
}

/// Status server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_port() -> u16 {
    8080
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub library: SanitizedLibraryConfig,
    pub database: DatabaseConfig,
    pub service: ServiceConfig,
    pub transcoder: TranscoderConfig,
    pub pools: PoolsConfig,
    pub orchestrator: OrchestratorConfig,
    pub admission: AdmissionConfig,
    pub path_mappings: Vec<PathMapping>,
    pub host: HostConfig,
    pub audit: AuditConfig,
    pub notify: SanitizedNotifyConfig,
    pub server: ServerConfig,
    pub readonly: bool,
}

/// Library config with the token hidden
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedLibraryConfig {
    pub url: String,
    pub token_configured: bool,
    pub sections: Vec<String>,
    pub listing_interval_secs: u64,
    pub sessions_interval_secs: u64,
}

/// Webhook URLs often embed credentials
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedNotifyConfig {
    pub webhook_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            library: SanitizedLibraryConfig {
                url: config.library.url.clone(),
                token_configured: !config.library.token.is_empty(),
                sections: config.library.sections.clone(),
                listing_interval_secs: config.library.listing_interval_secs,
                sessions_interval_secs: config.library.sessions_interval_secs,
            },
            database: config.database.clone(),
            service: config.service.clone(),
            transcoder: config.transcoder.clone(),
            pools: config.pools.clone(),
            orchestrator: config.orchestrator.clone(),
            admission: config.admission.clone(),
            path_mappings: config.path_mappings.clone(),
            host: config.host.clone(),
            audit: config.audit.clone(),
            notify: SanitizedNotifyConfig {
                webhook_configured: config.notify.webhook_url.is_some(),
            },
            server: config.server.clone(),
            readonly: config.readonly,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{Comparator, MetricKey};

    const MINIMAL: &str = r#"
[library]
url = "http://plex.local:32400"
token = "secret-token"
sections = ["1", "2"]

[database]
path = "/var/lib/plex/com.plexapp.plugins.library.db"

[transcoder]
cache_dir = "/srv/cache"
"#;

    #[test]
    fn test_deserialize_minimal() {
        let config: Config = toml::from_str(MINIMAL).unwrap();
        assert_eq!(config.library.sections, vec!["1", "2"]);
        assert_eq!(config.library.listing_interval_secs, 3600);
        assert_eq!(config.database.busy_timeout_ms, 5000);
        assert_eq!(config.service.settle_secs, 10);
        assert_eq!(config.pools.transcoders, 1);
        assert_eq!(config.orchestrator.failed_codes, vec![405, 500]);
        assert_eq!(config.transcoder.engine.video_codec, "libx265");
        assert_eq!(config.server.port, 8080);
        assert!(config.admission.transcode.is_empty());
        assert_eq!(config.admission.rescan_windows.len(), 1);
        assert!(!config.readonly);
    }

    #[test]
    fn test_deserialize_missing_library_fails() {
        let toml = r#"
[transcoder]
cache_dir = "/srv/cache"
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_admission_rules() {
        let toml = format!(
            r#"{}
[[admission.transcode]]
kind = "metric"
category = "library"
field = "playing_sessions"
op = "eq"
value = 0

[[admission.capacity]]
category = "storage"
field = "cache_size"
op = "gte"
value = 500000000000

[[admission.item_filter]]
field = "video_codec"
op = "neq"
value = "hevc"

[[path_mappings]]
remote = "/data"
local = "/mnt/nas"
"#,
            MINIMAL
        );
        let config: Config = toml::from_str(&toml).unwrap();
        assert_eq!(
            config.admission.transcode[0],
            Rule::metric(MetricKey::LibraryPlayingSessions, Comparator::Eq, 0.0)
        );
        assert_eq!(config.admission.capacity[0].key, MetricKey::StorageCacheSize);
        assert_eq!(config.admission.item_filter.len(), 1);
        assert_eq!(config.path_mappings[0].local, PathBuf::from("/mnt/nas"));
    }

    #[test]
    fn test_sanitized_config_hides_secrets() {
        let mut config: Config = toml::from_str(MINIMAL).unwrap();
        config.notify.webhook_url = Some("https://hooks.example/secret".to_string());

        let sanitized = SanitizedConfig::from(&config);
        assert!(sanitized.library.token_configured);
        assert!(sanitized.notify.webhook_configured);

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("secret-token"));
        assert!(!json.contains("hooks.example"));
    }
}
