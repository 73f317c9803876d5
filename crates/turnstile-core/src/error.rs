//! Error taxonomy for the ticketing core.
//!
//! [`TicketError`] carries both the caller-facing outcomes (capacity
//! exhausted, unauthorized agent, unknown code, ...) and the internal faults
//! (storage failures, capacity underflow). Callers decide retry policy; the
//! core never retries a capacity or authorization failure on its own.

use turnstile_types::{AgentId, BookingId, EventId, TierId};

/// Errors returned by the ticketing core.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TicketError {
    /// The tier cannot fit the requested quantity.
    #[error("insufficient stock in tier {tier_id}: requested {requested}, available {available}")]
    InsufficientStock {
        /// The tier that ran out.
        tier_id: TierId,
        /// Units requested by the caller.
        requested: u32,
        /// Units that were still available when the request was refused.
        available: u32,
    },

    /// Unknown, blocked or out-of-scope agent credential.
    #[error("agent is not authorized for this event")]
    Unauthorized,

    /// The code does not resolve to any unit.
    #[error("unit code not found")]
    NotFound,

    /// A unit of the booking has already been used.
    #[error("booking {0} has checked-in units")]
    AlreadyCheckedIn(BookingId),

    /// The organizer lacks the permission to undo a check-in.
    #[error("reversal requires owner or manager permission on the event")]
    ReversalDenied,

    /// The unit being reversed was never checked in.
    #[error("unit has not been checked in")]
    NotCheckedIn,

    /// Quantity outside the accepted range.
    #[error("quantity must be between 1 and {max}, got {quantity}")]
    InvalidQuantity {
        /// Requested quantity.
        quantity: u32,
        /// Largest quantity accepted for one booking.
        max: u32,
    },

    /// A field failed validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No event with this ID is visible to the caller.
    #[error("event {0} not found")]
    EventNotFound(EventId),

    /// No tier with this ID exists for the event.
    #[error("tier {0} not found")]
    TierNotFound(TierId),

    /// No booking with this ID exists.
    #[error("booking {0} not found")]
    BookingNotFound(BookingId),

    /// No agent with this ID is visible to the caller.
    #[error("agent {0} not found")]
    AgentNotFound(AgentId),

    /// A generated code collided with an existing one.
    #[error("generated code collided with an existing code")]
    CodeCollision,

    /// Every generation attempt collided.
    #[error("no unique code found after {0} attempts")]
    CodeSpaceExhausted(u32),

    /// A release would drive a tier's reserved count below zero.
    #[error("release of {quantity} from tier {tier_id} exceeds reserved count {reserved}")]
    CapacityUnderflow {
        /// The tier being released.
        tier_id: TierId,
        /// Units the caller tried to release.
        quantity: u32,
        /// Units reserved at the time.
        reserved: u32,
    },

    /// The storage backend failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl TicketError {
    /// Whether the error reports a caller mistake or a business outcome
    /// rather than an internal fault.
    pub const fn is_client_error(&self) -> bool {
        !matches!(
            self,
            Self::CapacityUnderflow { .. }
                | Self::Storage(_)
                | Self::CodeCollision
                | Self::CodeSpaceExhausted(_)
        )
    }
}

/// Convenience alias used throughout the core.
pub type TicketResult<T> = Result<T, TicketError>;
