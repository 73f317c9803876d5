//! Storage traits the core services are written against.
//!
//! Two operations carry the consistency guarantees of the whole system and
//! must be implemented as a single atomic step by every backend:
//!
//! - [`TierStore::reserve`] (and the reservation inside
//!   [`BookingStore::insert_booking`]): check `reserved + q <= total` and
//!   increment in the same step.
//! - [`BookingStore::mark_checked_in`]: flip `checked_in_at` from null to a
//!   timestamp only when it is still null.
//!
//! Everything else tolerates ordinary read-committed semantics.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use turnstile_types::{
    Agent, AgentId, AgentScope, AgentStatus, Availability, Booking, BookingId, CheckinAttempt,
    Event, EventId, EventStats, OrganizerId, Reservation, TicketTier, TicketUnit, TierId,
    UnitCode,
};

use crate::error::TicketResult;
use crate::memory::MemoryStore;

/// Result of the conditional first-use update on a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkOutcome {
    /// This call performed the null-to-now transition.
    Admitted(TicketUnit),
    /// Another call got there first; the unit carries its timestamp and agent.
    AlreadyCheckedIn(TicketUnit),
    /// The unit belongs to a cancelled booking.
    Voided(TicketUnit),
    /// No unit with this code exists.
    Missing,
}

/// Events and their owning organizer.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist a new event.
    async fn insert_event(&self, event: &Event) -> TicketResult<()>;

    /// Look up an event.
    async fn get_event(&self, id: EventId) -> TicketResult<Option<Event>>;
}

/// Ticket tiers and their capacity counters.
#[async_trait]
pub trait TierStore: Send + Sync {
    /// Persist a new tier.
    async fn insert_tier(&self, tier: &TicketTier) -> TicketResult<()>;

    /// Look up a tier.
    async fn get_tier(&self, id: TierId) -> TicketResult<Option<TicketTier>>;

    /// All tiers of an event, oldest first.
    async fn list_tiers(&self, event_id: EventId) -> TicketResult<Vec<TicketTier>>;

    /// Atomically reserve `quantity` units.
    ///
    /// Fails with `InsufficientStock` without changing anything when the
    /// tier cannot fit the quantity.
    async fn reserve(&self, tier_id: TierId, quantity: u32) -> TicketResult<Reservation>;

    /// Return `quantity` units to the tier.
    ///
    /// Fails with `CapacityUnderflow` instead of going below zero.
    async fn release(&self, tier_id: TierId, quantity: u32) -> TicketResult<()>;

    /// Current capacity snapshot.
    async fn availability(&self, tier_id: TierId) -> TicketResult<Availability>;
}

/// Bookings and their units.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Reserve `booking.quantity` units of `booking.tier_id` and persist the
    /// booking with one unit per code, all or nothing.
    ///
    /// Fails with `InsufficientStock` or `CodeCollision` leaving no trace.
    async fn insert_booking(&self, booking: &Booking) -> TicketResult<()>;

    /// Look up a booking.
    async fn get_booking(&self, id: BookingId) -> TicketResult<Option<Booking>>;

    /// Void every unit, release the reserved capacity and stamp the booking,
    /// all or nothing.
    ///
    /// Fails with `AlreadyCheckedIn` if any unit has been used. Cancelling a
    /// cancelled booking returns it unchanged.
    async fn cancel_booking(&self, id: BookingId, at: DateTime<Utc>) -> TicketResult<Booking>;

    /// A unit and its parent booking.
    async fn find_unit(&self, code: &UnitCode) -> TicketResult<Option<(TicketUnit, Booking)>>;

    /// Conditionally record first use of a unit.
    async fn mark_checked_in(
        &self,
        code: &UnitCode,
        agent_id: AgentId,
        at: DateTime<Utc>,
    ) -> TicketResult<MarkOutcome>;

    /// Clear a recorded check-in. Returns the unit as it was before the
    /// reversal, or `None` if it was not checked in.
    async fn reverse_checkin(&self, code: &UnitCode) -> TicketResult<Option<TicketUnit>>;

    /// Dashboard counters for an event.
    async fn event_stats(&self, event_id: EventId) -> TicketResult<EventStats>;
}

/// Agent credentials.
#[async_trait]
pub trait AgentStore: Send + Sync {
    /// Persist a new agent. Fails with `CodeCollision` if the access code is
    /// taken.
    async fn insert_agent(&self, agent: &Agent) -> TicketResult<()>;

    /// Look up an agent by ID.
    async fn get_agent(&self, id: AgentId) -> TicketResult<Option<Agent>>;

    /// Look up an agent by its current access code.
    async fn find_by_access_code(&self, access_code: &str) -> TicketResult<Option<Agent>>;

    /// All agents of an organizer, oldest first.
    async fn list_agents(&self, organizer_id: OrganizerId) -> TicketResult<Vec<Agent>>;

    /// Replace the agent's scope.
    async fn update_scope(&self, id: AgentId, scope: &AgentScope) -> TicketResult<Option<Agent>>;

    /// Replace the agent's status.
    async fn update_status(&self, id: AgentId, status: AgentStatus)
    -> TicketResult<Option<Agent>>;

    /// Swap the access code; the old one stops resolving immediately.
    /// Fails with `CodeCollision` if the new code is taken.
    async fn replace_access_code(&self, id: AgentId, access_code: &str)
    -> TicketResult<Option<Agent>>;

    /// Remove the agent. Returns whether it existed.
    async fn delete_agent(&self, id: AgentId) -> TicketResult<bool>;
}

/// Advisory last-seen timestamps for agents.
#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// Record a heartbeat.
    async fn touch(&self, agent_id: AgentId, at: DateTime<Utc>) -> TicketResult<()>;

    /// Last heartbeat, if any.
    async fn last_seen(&self, agent_id: AgentId) -> TicketResult<Option<DateTime<Utc>>>;
}

/// Append-only check-in audit trail.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append one row. Appending the same row twice is harmless.
    async fn append(&self, attempt: &CheckinAttempt) -> TicketResult<()>;

    /// Every row recorded for a code, oldest first.
    async fn attempts_for_code(&self, code: &str) -> TicketResult<Vec<CheckinAttempt>>;
}

/// The storage handles the services are built from.
#[derive(Clone)]
pub struct Stores {
    /// Event registry.
    pub events: Arc<dyn EventStore>,
    /// Tier capacity counters.
    pub tiers: Arc<dyn TierStore>,
    /// Bookings and units.
    pub bookings: Arc<dyn BookingStore>,
    /// Agent credentials.
    pub agents: Arc<dyn AgentStore>,
    /// Agent heartbeats.
    pub presence: Arc<dyn PresenceStore>,
    /// Check-in audit trail.
    pub audit: Arc<dyn AuditStore>,
}

impl Stores {
    /// Every handle backed by one shared [`MemoryStore`].
    pub fn in_memory() -> Self {
        Self::from_memory(&Arc::new(MemoryStore::new()))
    }

    /// Every handle backed by the given [`MemoryStore`].
    pub fn from_memory(store: &Arc<MemoryStore>) -> Self {
        Self {
            events: Arc::clone(store) as Arc<dyn EventStore>,
            tiers: Arc::clone(store) as Arc<dyn TierStore>,
            bookings: Arc::clone(store) as Arc<dyn BookingStore>,
            agents: Arc::clone(store) as Arc<dyn AgentStore>,
            presence: Arc::clone(store) as Arc<dyn PresenceStore>,
            audit: Arc::clone(store) as Arc<dyn AuditStore>,
        }
    }
}
