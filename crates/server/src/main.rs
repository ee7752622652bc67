mod api;
mod metrics;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use grinder_core::{
    create_audit_system, create_notifier, load_config, validate_config, AuditEvent, AuditHandle,
    AuditStore, Collaborators, FfmpegConverter, FsMover, LocalHostProbe, Notifier, Orchestrator,
    PlexConnector, ProcessTerminator, ShellServiceControl, SqliteAuditStore,
    SqliteLibraryDatabase,
};

use api::create_router;
use state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// How long pending audit events may take to flush on shutdown.
const AUDIT_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

/// `GRINDER_CONFIG`, then the first argument, then `config.toml`.
fn config_path() -> PathBuf {
    std::env::var("GRINDER_CONFIG")
        .ok()
        .or_else(|| std::env::args().nth(1))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"))
}

async fn run() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = config_path();
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    info!(
        sections = ?config.library.sections,
        transcoders = config.pools.transcoders,
        cache = %config.transcoder.cache_dir.display(),
        "Configuration loaded"
    );
    if config.readonly {
        warn!("Readonly mode: nothing will be transcoded, moved or written");
    }

    // Compute config hash for audit
    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    let config_hash_short = &config_hash[..16];

    let (audit_store, audit_handle, writer_handle) = if config.audit.enabled {
        let store: Arc<dyn AuditStore> = Arc::new(
            SqliteAuditStore::new(&config.audit.path).context("Failed to create audit store")?,
        );
        if let Some(days) = config.audit.retention_days {
            let cutoff = Utc::now() - chrono::Duration::days(i64::from(days));
            match store.purge_before(cutoff) {
                Ok(purged) => info!(purged, retention_days = days, "Purged old audit records"),
                Err(e) => warn!("Failed to purge audit records: {}", e),
            }
        }
        let (handle, writer) =
            create_audit_system(Arc::clone(&store), config.audit.channel_capacity);
        let writer_handle = tokio::spawn(writer.run());
        info!("Audit store initialized at {:?}", config.audit.path);
        (Some(store), Some(handle), Some(writer_handle))
    } else {
        info!("Audit disabled");
        (None, None, None)
    };

    emit(
        &audit_handle,
        AuditEvent::ServiceStarted {
            version: VERSION.to_string(),
            config_hash: config_hash_short.to_string(),
        },
    )
    .await;

    let notifier: Arc<dyn Notifier> = Arc::from(create_notifier(&config.notify));
    info!(notifier = notifier.name(), "Notifier ready");

    let collaborators = Collaborators {
        connector: Arc::new(PlexConnector::new(config.library.clone())),
        host: Arc::new(LocalHostProbe::new(
            config.transcoder.cache_dir.clone(),
            &config.host,
        )),
        converter: Arc::new(FfmpegConverter::new(config.transcoder.engine.clone())),
        mover: Arc::new(FsMover::new()),
        database: Arc::new(SqliteLibraryDatabase::new(&config.database)),
        service: Arc::new(ShellServiceControl::new(&config.service)),
        fatal: Arc::new(ProcessTerminator::default()),
        notifier,
        audit: audit_handle.clone(),
    };

    let orchestrator = Orchestrator::new(&config, collaborators);
    let status = orchestrator.subscribe();

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let orchestrator_handle = tokio::spawn(orchestrator.run(shutdown_rx));

    if config.server.enabled {
        let state = Arc::new(AppState::new(config.clone(), audit_store, status));
        let app = create_router(state);

        let addr = SocketAddr::new(config.server.host, config.server.port);
        info!("Starting status server on {}", addr);
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind to {}", addr))?;

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("Server error")?;
    } else {
        info!("Status server disabled");
        shutdown_signal().await;
    }

    info!("Shutting down...");
    let _ = shutdown_tx.send(());
    if let Err(e) = orchestrator_handle.await {
        error!("Orchestrator task failed: {}", e);
    }

    emit(
        &audit_handle,
        AuditEvent::ServiceStopped {
            reason: "graceful_shutdown".to_string(),
        },
    )
    .await;

    // The writer stops once every AuditHandle is gone.
    drop(audit_handle);
    if let Some(writer) = writer_handle {
        if tokio::time::timeout(AUDIT_FLUSH_TIMEOUT, writer).await.is_err() {
            warn!("Audit writer did not finish in time");
        } else {
            info!("Audit writer stopped");
        }
    }

    Ok(())
}

async fn emit(audit: &Option<AuditHandle>, event: AuditEvent) {
    if let Some(audit) = audit {
        audit.emit(event).await;
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
