pub mod audit;
pub mod config;
pub mod converter;
pub mod database;
pub mod host;
pub mod library;
pub mod metrics;
pub mod monitor;
pub mod mover;
pub mod notify;
pub mod orchestrator;
pub mod organizer;
pub mod rules;
pub mod service;
pub mod testing;
pub mod transcoder;

pub use audit::{
    create_audit_system, AuditError, AuditEvent, AuditFilter, AuditHandle, AuditRecord,
    AuditStore, SqliteAuditStore,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use converter::{Converter, ConverterError, FfmpegConverter};
pub use database::{LibraryDatabase, SqliteLibraryDatabase};
pub use host::{HostProbe, LocalHostProbe};
pub use library::{LibraryClient, LibraryConnector, MediaItem, PathMapper, PlexConnector};
pub use monitor::{MetricsSnapshot, Monitor, MonitorState};
pub use mover::{FileMover, FsMover};
pub use notify::{create_notifier, Notification, Notifier};
pub use orchestrator::{Collaborators, Orchestrator, OrchestratorStatus, Phase};
pub use organizer::{FatalHandler, Organizer, ProcessTerminator, FATAL_EXIT_CODE};
pub use rules::{MetricRule, Rule};
pub use service::{ServiceControl, ShellServiceControl};
pub use transcoder::{ResultCode, Transcoder};
