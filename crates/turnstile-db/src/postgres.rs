//! `PostgreSQL` pool behind the ticketing stores.
//!
//! The pool is sized from the `storage` section of the config. A reservation
//! holds a connection for one guarded `UPDATE`, and a check-in for one
//! conditional `UPDATE`, so the pool bounds concurrent database work rather
//! than the number of scanning devices.

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tracing::info;
use turnstile_core::config::StorageConfig;

use crate::error::DbError;

/// How long a sale or scan waits for a free connection before failing.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection pool shared by every `Pg*` store.
#[derive(Clone)]
pub struct PostgresPool {
    pool: PgPool,
}

impl PostgresPool {
    /// Connect, then bring the schema up to date.
    ///
    /// This is what the server runs at startup.
    pub async fn open(storage: &StorageConfig) -> Result<Self, DbError> {
        let pool = Self::connect(storage).await?;
        pool.run_migrations().await?;
        Ok(pool)
    }

    /// Connect with the configured URL and pool size.
    ///
    /// # Errors
    ///
    /// [`DbError::Config`] if the URL does not parse, [`DbError::Postgres`]
    /// if the server is unreachable.
    pub async fn connect(storage: &StorageConfig) -> Result<Self, DbError> {
        let options = connect_options(&storage.postgres_url)?;
        let max_connections = storage.max_connections.max(1);
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(options)
            .await?;
        info!(max_connections, "Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Apply pending migrations from `migrations/`.
    pub async fn run_migrations(&self) -> Result<(), DbError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Ticketing schema migrated");
        Ok(())
    }

    /// The underlying [`PgPool`].
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Wait for checked-out connections to return, then close them.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("PostgreSQL pool closed");
    }
}

fn connect_options(url: &str) -> Result<PgConnectOptions, DbError> {
    url.parse()
        .map_err(|e: sqlx::Error| DbError::Config(format!("Invalid database URL: {e}")))
}
