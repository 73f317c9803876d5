//! Shared type definitions for the Turnstile ticket sales and entry control
//! core.
//!
//! This crate is the single source of truth for all types used across the
//! Turnstile workspace. Types defined here flow downstream to `TypeScript`
//! via `ts-rs` for the organizer dashboards and scanning devices.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for all entity identifiers
//! - [`code`] -- The opaque [`UnitCode`] printed on tickets
//! - [`enums`] -- Channels, statuses, scopes, roles and check-in outcomes
//! - [`structs`] -- Events, tiers, bookings, units, agents and audit rows

pub mod code;
pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use code::{UnitCode, UnitCodeError};
pub use enums::{AgentScope, AgentStatus, CheckinOutcome, DenialReason, OrganizerRole, SalesChannel};
pub use ids::{AgentId, AttemptId, BookingId, EventId, OrganizerId, TierId};
pub use structs::{
    Agent, AgentListing, AgentRef, Availability, Booking, Buyer, CheckinAttempt, Event, EventStats,
    Reservation, TicketTier, TicketUnit,
};

#[cfg(test)]
mod tests {
    //! `TypeScript` binding generation.

    #[test]
    fn export_bindings() {
        // ts-rs writes the files to `bindings/` relative to the crate root.
        use ts_rs::TS;

        // IDs
        let _ = crate::ids::OrganizerId::export_all();
        let _ = crate::ids::EventId::export_all();
        let _ = crate::ids::TierId::export_all();
        let _ = crate::ids::BookingId::export_all();
        let _ = crate::ids::AgentId::export_all();
        let _ = crate::ids::AttemptId::export_all();

        // Codes and enums
        let _ = crate::code::UnitCode::export_all();
        let _ = crate::enums::SalesChannel::export_all();
        let _ = crate::enums::AgentStatus::export_all();
        let _ = crate::enums::AgentScope::export_all();
        let _ = crate::enums::OrganizerRole::export_all();
        let _ = crate::enums::CheckinOutcome::export_all();
        let _ = crate::enums::DenialReason::export_all();

        // Structs
        let _ = crate::structs::Event::export_all();
        let _ = crate::structs::TicketTier::export_all();
        let _ = crate::structs::Availability::export_all();
        let _ = crate::structs::Reservation::export_all();
        let _ = crate::structs::Buyer::export_all();
        let _ = crate::structs::Booking::export_all();
        let _ = crate::structs::TicketUnit::export_all();
        let _ = crate::structs::Agent::export_all();
        let _ = crate::structs::AgentRef::export_all();
        let _ = crate::structs::AgentListing::export_all();
        let _ = crate::structs::CheckinAttempt::export_all();
        let _ = crate::structs::EventStats::export_all();
    }
}
