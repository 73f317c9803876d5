//! Error types for the Turnstile server binary.
//!
//! [`ServerError`] wraps every failure mode of startup and serving so
//! `main` can propagate with `?`.

/// Top-level error for the server binary.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: turnstile_core::config::ConfigError,
    },

    /// Connecting to or migrating a storage backend failed.
    #[error("storage error: {source}")]
    Storage {
        /// The underlying database error.
        #[from]
        source: turnstile_db::DbError,
    },

    /// The HTTP server failed to bind or serve.
    #[error("api error: {source}")]
    Api {
        /// The underlying server error.
        #[from]
        source: turnstile_api::ServerError,
    },
}
