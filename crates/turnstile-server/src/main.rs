//! Turnstile server binary.
//!
//! Loads configuration, wires the selected storage backend into the
//! ticketing services and serves the HTTP API until `Ctrl-C`.
//!
//! # Startup Sequence
//!
//! 1. Load configuration (`TURNSTILE_CONFIG`, then `turnstile-config.yaml`,
//!    then defaults plus environment)
//! 2. Initialize structured logging (tracing)
//! 3. Connect the storage backend and run migrations
//! 4. Wire the ticketing services
//! 5. Serve the API until shutdown

mod error;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;
use turnstile_api::AppState;
use turnstile_core::config::{LoggingConfig, StorageBackend, StorageConfig};
use turnstile_core::{Stores, TurnstileConfig};
use turnstile_db::{DragonflyPresence, PostgresPool, postgres_stores};

use crate::error::ServerError;

/// Default configuration file, relative to the working directory.
const CONFIG_FILE: &str = "turnstile-config.yaml";

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    // 1. Load configuration.
    let config = load_config()?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!(
        backend = ?config.storage.backend,
        host = %config.server.host,
        port = config.server.port,
        "turnstile-server starting"
    );

    // 3. Connect storage.
    let (stores, pool) = connect_storage(&config.storage).await?;

    // 4. Wire services.
    let state = Arc::new(AppState::from_stores(&stores, &config));
    info!("Ticketing services initialized");

    // 5. Serve.
    let served = turnstile_api::start_server(&config.server, state).await;

    if let Some(pool) = pool {
        pool.close().await;
    }
    served?;
    info!("turnstile-server stopped");
    Ok(())
}

fn load_config() -> Result<TurnstileConfig, ServerError> {
    let path = std::env::var_os("TURNSTILE_CONFIG")
        .map_or_else(|| PathBuf::from(CONFIG_FILE), PathBuf::from);
    if path.exists() {
        Ok(TurnstileConfig::from_file(&path)?)
    } else {
        Ok(TurnstileConfig::from_env()?)
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

async fn connect_storage(
    storage: &StorageConfig,
) -> Result<(Stores, Option<PostgresPool>), ServerError> {
    match storage.backend {
        StorageBackend::Memory => {
            info!("Using in-memory storage");
            Ok((Stores::in_memory(), None))
        }
        StorageBackend::Postgres => {
            let pool = PostgresPool::open(storage).await?;

            let presence = match &storage.dragonfly_url {
                Some(url) => {
                    let presence = DragonflyPresence::connect(url).await?;
                    info!("Dragonfly presence connected");
                    Some(presence)
                }
                None => None,
            };
            let stores = postgres_stores(&pool, presence);
            Ok((stores, Some(pool)))
        }
    }
}
