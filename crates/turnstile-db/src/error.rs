//! Error types for the storage backends.
//!
//! All errors are propagated via [`DbError`], which wraps the underlying
//! [`sqlx`] and [`fred`] errors. Business outcomes detected inside a
//! statement (capacity exhausted, code collision, ...) travel as
//! [`DbError::Ticket`] and come back out unchanged when converted to a
//! [`TicketError`].

use turnstile_core::TicketError;

/// Errors that can occur in the data layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `PostgreSQL` migration failed.
    #[error("PostgreSQL migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A `Dragonfly`/Redis operation failed.
    #[error("Dragonfly error: {0}")]
    Dragonfly(#[from] fred::error::Error),

    /// A stored value does not map back onto the domain type.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A business outcome detected by the database.
    #[error(transparent)]
    Ticket(#[from] TicketError),
}

impl DbError {
    /// Whether the error is a unique-constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Postgres(sqlx::Error::Database(db)) => db.is_unique_violation(),
            _ => false,
        }
    }

    /// Wrap a write error, turning a unique violation on a code column into
    /// [`TicketError::CodeCollision`].
    pub fn code_collision_or(err: sqlx::Error) -> Self {
        let err = Self::from(err);
        if err.is_unique_violation() {
            Self::Ticket(TicketError::CodeCollision)
        } else {
            err
        }
    }
}

impl From<DbError> for TicketError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Ticket(inner) => inner,
            other => Self::Storage(other.to_string()),
        }
    }
}
