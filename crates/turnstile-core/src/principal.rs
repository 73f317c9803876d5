//! The organizer on whose behalf a console request runs.

use serde::{Deserialize, Serialize};
use turnstile_types::{EventId, OrganizerId, OrganizerRole};

use crate::error::{TicketError, TicketResult};
use crate::store::EventStore;

/// An authenticated organizer and its role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organizer {
    /// The organizer account.
    pub organizer_id: OrganizerId,
    /// Permission level of the caller within that account.
    pub role: OrganizerRole,
}

impl Organizer {
    /// Construct a principal.
    pub const fn new(organizer_id: OrganizerId, role: OrganizerRole) -> Self {
        Self { organizer_id, role }
    }

    /// Whether the caller may undo a recorded check-in.
    pub const fn is_elevated(&self) -> bool {
        self.role.can_reverse_checkins()
    }

    /// Load an event and confirm this organizer owns it.
    ///
    /// Events of other organizers are reported as missing.
    pub async fn owned_event(
        &self,
        events: &dyn EventStore,
        event_id: EventId,
    ) -> TicketResult<turnstile_types::Event> {
        match events.get_event(event_id).await? {
            Some(event) if event.organizer_id == self.organizer_id => Ok(event),
            _ => Err(TicketError::EventNotFound(event_id)),
        }
    }
}
