//! Ticket sales and entry control for Turnstile.
//!
//! This crate guarantees the two properties the rest of the system leans
//! on: a tier never sells past its capacity, and a unit code admits its
//! holder at most once. Both come down to a single atomic step in the
//! storage backend; the services here validate, classify, log and audit
//! around those steps.
//!
//! # Modules
//!
//! - [`catalog`] -- Events, ticket tiers and their capacity.
//! - [`ledger`] -- Bookings, unit codes and cancellation.
//! - [`access`] -- Scanning credentials, scope and presence.
//! - [`checkin`] -- Scan classification, reversal and dashboard counters.
//! - [`audit`] -- Audit trail delivery and the live check-in feed.
//! - [`store`] -- Storage traits and the [`Stores`] bundle.
//! - [`memory`] -- In-process backend.
//! - [`codes`] -- Random unit and access codes.
//! - [`principal`] -- The organizer behind a console request.
//! - [`config`] -- Configuration loading from `turnstile-config.yaml`.
//! - [`error`] -- [`TicketError`].

pub mod access;
pub mod audit;
pub mod catalog;
pub mod checkin;
pub mod codes;
pub mod config;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod principal;
pub mod store;

use std::sync::Arc;

pub use access::AgentAccess;
pub use audit::AuditRecorder;
pub use catalog::{Catalog, NewTier};
pub use checkin::{CheckinEngine, CheckinResult, ScannedUnit};
pub use codes::{CodeGenerator, RandomCodes};
pub use config::TurnstileConfig;
pub use error::{TicketError, TicketResult};
pub use ledger::{BookingLedger, NewBooking};
pub use principal::Organizer;
pub use store::Stores;

/// Every service, wired to one set of stores.
#[derive(Clone)]
pub struct TicketingCore {
    /// Events and tiers.
    pub catalog: Catalog,
    /// Bookings and unit codes.
    pub ledger: BookingLedger,
    /// Scanning credentials.
    pub access: AgentAccess,
    /// Scan classification.
    pub checkin: CheckinEngine,
}

impl TicketingCore {
    /// Wire the services with random code generation.
    ///
    /// Spawns the audit retry task, so it must run inside a Tokio runtime.
    pub fn new(stores: &Stores, config: &TurnstileConfig) -> Self {
        Self::with_codes(stores, config, Arc::new(RandomCodes::new(&config.codes)))
    }

    /// Wire the services with a given code generator.
    pub fn with_codes(
        stores: &Stores,
        config: &TurnstileConfig,
        codes: Arc<dyn CodeGenerator>,
    ) -> Self {
        let access = AgentAccess::new(stores, Arc::clone(&codes), config);
        let audit = AuditRecorder::spawn(Arc::clone(&stores.audit), &config.audit);
        Self {
            catalog: Catalog::new(stores),
            ledger: BookingLedger::new(stores, codes, config),
            checkin: CheckinEngine::new(stores, access.clone(), audit),
            access,
        }
    }
}
