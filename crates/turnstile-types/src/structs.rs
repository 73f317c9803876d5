//! Core entity structs for the ticketing core.
//!
//! Entities mirror the rows persisted by the storage backends. Mutable shared
//! state is limited to [`TicketTier::reserved_count`] and
//! [`TicketUnit::checked_in_at`]; everything else is written once or tolerates
//! eventual consistency.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::code::UnitCode;
use crate::enums::{AgentScope, AgentStatus, CheckinOutcome, DenialReason, SalesChannel};
use crate::ids::{AgentId, AttemptId, BookingId, EventId, OrganizerId, TierId};

// ---------------------------------------------------------------------------
// Events and tiers
// ---------------------------------------------------------------------------

/// A dated show owned by one organizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Event {
    /// Unique event identifier.
    pub id: EventId,
    /// Organizer that owns the event and its agents.
    pub organizer_id: OrganizerId,
    /// Display name.
    pub name: String,
    /// Scheduled start, if announced.
    pub starts_at: Option<DateTime<Utc>>,
    /// When the event was created.
    pub created_at: DateTime<Utc>,
}

/// A purchasable class of ticket for one event.
///
/// Invariant: `reserved_count <= total_capacity` at all times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TicketTier {
    /// Unique tier identifier.
    pub id: TierId,
    /// Event the tier belongs to.
    pub event_id: EventId,
    /// Display name (e.g. `"VIP"`).
    pub name: String,
    /// Unit price.
    #[ts(as = "String")]
    pub price: Decimal,
    /// Number of units that may ever be sold.
    pub total_capacity: u32,
    /// Number of units currently sold and not released.
    pub reserved_count: u32,
    /// When the tier was defined.
    pub created_at: DateTime<Utc>,
}

impl TicketTier {
    /// Units still available for sale.
    pub const fn available(&self) -> u32 {
        self.total_capacity.saturating_sub(self.reserved_count)
    }

    /// Whether `quantity` more units fit under the capacity.
    pub const fn can_reserve(&self, quantity: u32) -> bool {
        match self.reserved_count.checked_add(quantity) {
            Some(total) => total <= self.total_capacity,
            None => false,
        }
    }
}

/// Display snapshot of a tier's remaining capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Availability {
    /// The tier this snapshot describes.
    pub tier_id: TierId,
    /// Units still for sale.
    pub available: u32,
    /// Total capacity of the tier.
    pub total: u32,
}

impl From<&TicketTier> for Availability {
    fn from(tier: &TicketTier) -> Self {
        Self {
            tier_id: tier.id,
            available: tier.available(),
            total: tier.total_capacity,
        }
    }
}

/// Proof of a successful capacity reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Reservation {
    /// The tier the units were reserved from.
    pub tier_id: TierId,
    /// Units reserved by this call.
    pub quantity: u32,
    /// Units left in the tier right after the reservation.
    pub remaining: u32,
}

// ---------------------------------------------------------------------------
// Bookings and units
// ---------------------------------------------------------------------------

/// Contact details of the person who bought a booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Buyer {
    /// Buyer's full name.
    pub name: String,
    /// Email address or phone number.
    pub contact: String,
}

/// One sale transaction: one or more units of one tier.
///
/// Invariant: `quantity == unit_codes.len()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Booking {
    /// Unique booking identifier.
    pub id: BookingId,
    /// Event the booking admits to.
    pub event_id: EventId,
    /// Tier the units were sold from.
    pub tier_id: TierId,
    /// Number of units sold.
    pub quantity: u32,
    /// Who bought the units.
    pub buyer: Buyer,
    /// Where the sale happened.
    pub channel: SalesChannel,
    /// When the sale was recorded.
    pub created_at: DateTime<Utc>,
    /// One code per admitted person.
    pub unit_codes: Vec<UnitCode>,
    /// Set once the booking is cancelled and its units voided.
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Booking {
    /// Whether the booking has been cancelled.
    pub const fn is_cancelled(&self) -> bool {
        self.cancelled_at.is_some()
    }
}

/// One physical admission right.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TicketUnit {
    /// The printed code.
    pub code: UnitCode,
    /// Booking the unit was sold in.
    pub booking_id: BookingId,
    /// Event the unit admits to.
    pub event_id: EventId,
    /// First-use timestamp; set at most once unless manually reversed.
    pub checked_in_at: Option<DateTime<Utc>>,
    /// Agent that recorded the first use.
    pub checked_in_by: Option<AgentId>,
    /// Set when the parent booking was cancelled.
    pub voided_at: Option<DateTime<Utc>>,
}

impl TicketUnit {
    /// Whether the unit has been used.
    pub const fn is_checked_in(&self) -> bool {
        self.checked_in_at.is_some()
    }

    /// Whether the unit was invalidated by a cancellation.
    pub const fn is_voided(&self) -> bool {
        self.voided_at.is_some()
    }
}

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

/// A scanning credential bound to an organizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Agent {
    /// Unique agent identifier.
    pub id: AgentId,
    /// Organizer that issued the credential.
    pub organizer_id: OrganizerId,
    /// Name shown on dashboards and in "already used by" messages.
    pub display_name: String,
    /// Secret typed into the scanning device.
    pub access_code: String,
    /// Active or blocked.
    pub status: AgentStatus,
    /// Events the agent may scan for.
    pub scope: AgentScope,
    /// Last heartbeat, if any (advisory).
    pub last_seen_at: Option<DateTime<Utc>>,
    /// When the credential was issued.
    pub created_at: DateTime<Utc>,
}

/// The non-secret part of an agent, as attached to check-in responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct AgentRef {
    /// Agent identifier.
    pub id: AgentId,
    /// Organizer that issued the credential.
    pub organizer_id: OrganizerId,
    /// Display name.
    pub display_name: String,
}

impl From<&Agent> for AgentRef {
    fn from(agent: &Agent) -> Self {
        Self {
            id: agent.id,
            organizer_id: agent.organizer_id,
            display_name: agent.display_name.clone(),
        }
    }
}

/// An agent as listed on the organizer console, with its presence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct AgentListing {
    /// The credential itself.
    #[serde(flatten)]
    pub agent: Agent,
    /// Whether a heartbeat arrived within the online window.
    pub online: bool,
}

// ---------------------------------------------------------------------------
// Audit and dashboards
// ---------------------------------------------------------------------------

/// One append-only audit row for a validation attempt or a reversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CheckinAttempt {
    /// Unique attempt identifier.
    pub id: AttemptId,
    /// The code as presented (normalized when it parsed).
    pub code: String,
    /// Agent that presented the code, when it authenticated.
    pub agent_id: Option<AgentId>,
    /// Organizer that performed a reversal.
    pub organizer_id: Option<OrganizerId>,
    /// Event the device was scanning for.
    pub event_id: EventId,
    /// Classification of the attempt.
    pub outcome: CheckinOutcome,
    /// Reason, for denied attempts.
    pub reason: Option<DenialReason>,
    /// When the attempt was classified.
    pub recorded_at: DateTime<Utc>,
}

/// Dashboard counters for one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct EventStats {
    /// Units sold and not voided.
    pub total_units: u64,
    /// Units checked in.
    pub checked_in: u64,
}
