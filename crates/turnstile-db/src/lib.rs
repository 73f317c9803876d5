//! Durable storage for Turnstile (`PostgreSQL` + `Dragonfly`).
//!
//! `PostgreSQL` holds events, tiers, bookings, units, agents and the audit
//! trail. The two consistency-critical steps (capacity reservation and
//! first use of a unit) are single conditional `UPDATE` statements, so any
//! number of server processes can share one database. `Dragonfly` is
//! optional and only carries agent heartbeats.
//!
//! # Architecture
//!
//! ```text
//! turnstile-core services
//!     |
//!     +-- Stores ---------------> PostgreSQL (PostgresPool)
//!     |   |-- PgCatalogStore      (events, tiers, reserved_count)
//!     |   |-- PgBookingStore      (bookings, units, check-in flag)
//!     |   |-- PgAgentStore        (credentials and scope)
//!     |   +-- PgAuditStore        (append-only attempts)
//!     |
//!     +-- presence -------------> Dragonfly (DragonflyPresence)
//!                                 or agents.last_seen_at (PgPresence)
//! ```
//!
//! # Modules
//!
//! - [`postgres`] -- `PostgreSQL` connection pool and configuration
//! - [`catalog_store`] -- Events and tier capacity
//! - [`booking_store`] -- Bookings, units and check-in
//! - [`agent_store`] -- Agent credentials and `PostgreSQL` presence
//! - [`audit_store`] -- Check-in audit rows
//! - [`dragonfly`] -- `Dragonfly` presence
//! - [`error`] -- Shared error types

pub mod agent_store;
pub mod audit_store;
pub mod booking_store;
pub mod catalog_store;
mod columns;
pub mod dragonfly;
pub mod error;
pub mod postgres;

use std::sync::Arc;

use turnstile_core::Stores;
use turnstile_core::store::{EventStore, PresenceStore};

// Re-export primary types for convenience.
pub use agent_store::{AgentRow, PgAgentStore, PgPresence};
pub use audit_store::{AttemptRow, PgAuditStore};
pub use booking_store::{BookingRow, PgBookingStore, UnitRow};
pub use catalog_store::{EventRow, PgCatalogStore, TierRow};
pub use dragonfly::DragonflyPresence;
pub use error::DbError;
pub use postgres::PostgresPool;

/// Build the service stores on a `PostgreSQL` pool.
///
/// Heartbeats go to `Dragonfly` when a connection is given and to
/// `agents.last_seen_at` otherwise.
pub fn postgres_stores(pool: &PostgresPool, presence: Option<DragonflyPresence>) -> Stores {
    let pg = pool.pool().clone();
    let catalog = Arc::new(PgCatalogStore::new(pg.clone()));
    let presence: Arc<dyn PresenceStore> = match presence {
        Some(dragonfly) => Arc::new(dragonfly),
        None => Arc::new(PgPresence::new(pg.clone())),
    };
    Stores {
        events: Arc::clone(&catalog) as Arc<dyn EventStore>,
        tiers: catalog,
        bookings: Arc::new(PgBookingStore::new(pg.clone())),
        agents: Arc::new(PgAgentStore::new(pg.clone())),
        presence,
        audit: Arc::new(PgAuditStore::new(pg)),
    }
}
