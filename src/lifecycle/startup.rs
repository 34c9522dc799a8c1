//! Startup orchestration.
//!
//! # Responsibilities
//! - Open the backing document
//! - Initialize subsystems in dependency order (metrics, watcher, server)
//! - Bind the listener last, once everything else is ready
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::Value;
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::http::HttpServer;
use crate::lifecycle::{signals, Shutdown};
use crate::observability::metrics;
use crate::store::watcher::DbWatcher;
use crate::store::{SharedStore, Store, StoreError};

/// Fatal startup failures.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("failed to open database: {0}")]
    Store(#[from] StoreError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),

    #[error("failed to watch database file: {0}")]
    Watch(#[from] notify::Error),
}

/// Open the store described by `config`.
pub async fn open_store(config: &ServerConfig) -> Result<SharedStore, StoreError> {
    let store = if config.store.in_memory {
        let value = match tokio::fs::read_to_string(&config.store.path).await {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Value::Object(Default::default()),
            Err(e) => return Err(e.into()),
        };
        Store::in_memory(value)?
    } else {
        Store::open(&config.store.path).await?
    };
    Ok(Arc::new(store))
}

/// Bring the whole server up and block until shutdown.
pub async fn run(config: ServerConfig) -> Result<(), StartupError> {
    let store = open_store(&config).await?;

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse::<SocketAddr>() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(&shutdown);

    // Keep the watcher alive for the lifetime of the server.
    let _watcher = match (config.store.watch, store.path()) {
        (true, Some(path)) => {
            let path = path.to_path_buf();
            Some(DbWatcher::new(&path, store.clone()).run(shutdown.subscribe())?)
        }
        _ => None,
    };

    let address = config.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind {
            address: address.clone(),
            source,
        })?;

    let local_addr = listener.local_addr()?;
    let resources = store.resource_names().await;
    tracing::info!(
        address = %local_addr,
        resources = ?resources,
        write_limit = config.write_limit.max_requests,
        window_secs = config.write_limit.window_secs,
        catalog = %config.catalog.collection,
        catalog_max = config.catalog.max_records,
        "Mock server listening"
    );

    let server = HttpServer::new(config, store);
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
