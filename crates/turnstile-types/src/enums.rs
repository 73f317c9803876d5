//! Enumeration types for the ticketing core.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::EventId;

// ---------------------------------------------------------------------------
// Sales
// ---------------------------------------------------------------------------

/// The channel through which a booking was sold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum SalesChannel {
    /// Public web checkout.
    Online,
    /// Point-of-sale terminal at the box office.
    Pos,
}

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

/// Whether an agent credential may authorize check-ins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum AgentStatus {
    /// The agent can scan tickets for the events in its scope.
    Active,
    /// The agent authorizes nothing until reactivated.
    Blocked,
}

/// The set of events an agent may scan for.
///
/// `AllEvents` always means the events of the agent's own organizer; an
/// agent never reaches another organizer's events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "kind", content = "event_ids", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum AgentScope {
    /// Every event owned by the agent's organizer.
    #[default]
    AllEvents,
    /// Only the listed events.
    Events(BTreeSet<EventId>),
}

impl AgentScope {
    /// Whether this scope admits the given event. Organizer ownership is
    /// checked separately by the access layer.
    pub fn includes(&self, event_id: EventId) -> bool {
        match self {
            Self::AllEvents => true,
            Self::Events(ids) => ids.contains(&event_id),
        }
    }
}

// ---------------------------------------------------------------------------
// Organizers
// ---------------------------------------------------------------------------

/// Permission level of an organizer console user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum OrganizerRole {
    /// Account owner.
    Owner,
    /// Manager with elevated permissions.
    Manager,
    /// Day-to-day staff.
    Staff,
}

impl OrganizerRole {
    /// Whether the role may undo a recorded check-in.
    pub const fn can_reverse_checkins(self) -> bool {
        matches!(self, Self::Owner | Self::Manager)
    }
}

// ---------------------------------------------------------------------------
// Check-in
// ---------------------------------------------------------------------------

/// Classification of one check-in attempt, as written to the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum CheckinOutcome {
    /// First use of the unit; the holder was admitted.
    Success,
    /// The unit had already been checked in.
    Already,
    /// The attempt was refused (see [`DenialReason`]).
    Denied,
    /// The code does not resolve to any unit.
    NotFound,
    /// An organizer cleared an earlier check-in.
    Reversed,
}

/// Why a check-in attempt was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum DenialReason {
    /// Unknown, blocked, or out-of-scope agent credential.
    Unauthorized,
    /// The code belongs to a different event than the one being scanned.
    WrongEvent,
    /// The code belongs to a cancelled booking.
    Voided,
}
