//! Events and their ticket tiers.
//!
//! The [`Catalog`] is the Ticket Tier Store's service face: organizers
//! define events and tiers through it, sales channels read availability,
//! and the atomic `reserve`/`release` pair is delegated to the backend.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, error, info};
use turnstile_types::{Availability, Event, EventId, Reservation, TicketTier, TierId};

use crate::error::{TicketError, TicketResult};
use crate::principal::Organizer;
use crate::store::{EventStore, Stores, TierStore};

/// Longest accepted event or tier name.
pub const MAX_NAME_LEN: usize = 200;

/// A tier an organizer wants to put on sale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTier {
    /// Event the tier belongs to.
    pub event_id: EventId,
    /// Display name, e.g. `VIP`.
    pub name: String,
    /// Unit price; must not be negative.
    pub price: Decimal,
    /// Units that may ever be sold; at least one.
    pub capacity: u32,
}

/// Event registry and tier capacity.
#[derive(Clone)]
pub struct Catalog {
    events: Arc<dyn EventStore>,
    tiers: Arc<dyn TierStore>,
}

impl Catalog {
    /// Build the catalog over the given stores.
    pub fn new(stores: &Stores) -> Self {
        Self {
            events: Arc::clone(&stores.events),
            tiers: Arc::clone(&stores.tiers),
        }
    }

    /// Register a new event owned by the organizer.
    pub async fn create_event(
        &self,
        organizer: &Organizer,
        name: &str,
        starts_at: Option<DateTime<Utc>>,
    ) -> TicketResult<Event> {
        let event = Event {
            id: EventId::new(),
            organizer_id: organizer.organizer_id,
            name: validate_name("event name", name)?,
            starts_at,
            created_at: Utc::now(),
        };
        self.events.insert_event(&event).await?;
        info!(event_id = %event.id, organizer_id = %event.organizer_id, "Event created");
        Ok(event)
    }

    /// Look up one of the organizer's events.
    pub async fn event(&self, organizer: &Organizer, event_id: EventId) -> TicketResult<Event> {
        organizer.owned_event(self.events.as_ref(), event_id).await
    }

    /// Add a tier to one of the organizer's events.
    pub async fn define_tier(&self, organizer: &Organizer, new: NewTier) -> TicketResult<TicketTier> {
        organizer
            .owned_event(self.events.as_ref(), new.event_id)
            .await?;
        if new.capacity == 0 {
            return Err(TicketError::InvalidInput(
                "tier capacity must be at least 1".to_owned(),
            ));
        }
        if new.price.is_sign_negative() {
            return Err(TicketError::InvalidInput(
                "tier price must not be negative".to_owned(),
            ));
        }

        let tier = TicketTier {
            id: TierId::new(),
            event_id: new.event_id,
            name: validate_name("tier name", &new.name)?,
            price: new.price,
            total_capacity: new.capacity,
            reserved_count: 0,
            created_at: Utc::now(),
        };
        self.tiers.insert_tier(&tier).await?;
        info!(
            tier_id = %tier.id,
            event_id = %tier.event_id,
            capacity = tier.total_capacity,
            "Tier defined"
        );
        Ok(tier)
    }

    /// Tiers of an event, oldest first.
    pub async fn list_tiers(&self, event_id: EventId) -> TicketResult<Vec<TicketTier>> {
        if self.events.get_event(event_id).await?.is_none() {
            return Err(TicketError::EventNotFound(event_id));
        }
        self.tiers.list_tiers(event_id).await
    }

    /// Look up a single tier.
    pub async fn tier(&self, tier_id: TierId) -> TicketResult<TicketTier> {
        self.tiers
            .get_tier(tier_id)
            .await?
            .ok_or(TicketError::TierNotFound(tier_id))
    }

    /// Capacity snapshot for display.
    pub async fn availability(&self, tier_id: TierId) -> TicketResult<Availability> {
        let availability = self.tiers.availability(tier_id).await?;
        debug!(%tier_id, available = availability.available, "Availability read");
        Ok(availability)
    }

    /// Atomically take `quantity` units of a tier.
    pub async fn reserve(&self, tier_id: TierId, quantity: u32) -> TicketResult<Reservation> {
        let reservation = self.tiers.reserve(tier_id, quantity).await?;
        debug!(%tier_id, quantity, remaining = reservation.remaining, "Units reserved");
        Ok(reservation)
    }

    /// Return `quantity` units to a tier.
    pub async fn release(&self, tier_id: TierId, quantity: u32) -> TicketResult<()> {
        match self.tiers.release(tier_id, quantity).await {
            Err(err @ TicketError::CapacityUnderflow { .. }) => {
                error!(%tier_id, quantity, %err, "Release would underflow reserved count");
                Err(err)
            }
            other => other,
        }
    }
}

/// Trim a display name and check its length.
pub(crate) fn validate_name(field: &str, raw: &str) -> TicketResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(TicketError::InvalidInput(format!("{field} must not be empty")));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(TicketError::InvalidInput(format!(
            "{field} must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name.to_owned())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use turnstile_types::{OrganizerId, OrganizerRole};

    use super::*;

    fn organizer() -> Organizer {
        Organizer::new(OrganizerId::new(), OrganizerRole::Owner)
    }

    async fn catalog_with_event() -> (Catalog, Organizer, Event) {
        let catalog = Catalog::new(&Stores::in_memory());
        let org = organizer();
        let event = catalog.create_event(&org, "  Summer Fest ", None).await.unwrap();
        (catalog, org, event)
    }

    fn general(event_id: EventId, capacity: u32) -> NewTier {
        NewTier {
            event_id,
            name: "General".to_owned(),
            price: Decimal::new(4500, 2),
            capacity,
        }
    }

    #[tokio::test]
    async fn event_names_are_trimmed() {
        let (_, _, event) = catalog_with_event().await;
        assert_eq!(event.name, "Summer Fest");
    }

    #[tokio::test]
    async fn define_tier_validates_input() {
        let (catalog, org, event) = catalog_with_event().await;
        let base = general(event.id, 2);

        let zero = NewTier { capacity: 0, ..base.clone() };
        assert!(matches!(
            catalog.define_tier(&org, zero).await,
            Err(TicketError::InvalidInput(_))
        ));

        let negative = NewTier { price: Decimal::new(-1, 0), ..base.clone() };
        assert!(matches!(
            catalog.define_tier(&org, negative).await,
            Err(TicketError::InvalidInput(_))
        ));

        let blank = NewTier { name: "   ".to_owned(), ..base.clone() };
        assert!(matches!(
            catalog.define_tier(&org, blank).await,
            Err(TicketError::InvalidInput(_))
        ));

        let tier = catalog.define_tier(&org, base).await.unwrap();
        assert_eq!(tier.available(), 2);
        assert_eq!(catalog.list_tiers(event.id).await.unwrap(), vec![tier]);
    }

    #[tokio::test]
    async fn foreign_organizer_cannot_define_tiers() {
        let (catalog, _, event) = catalog_with_event().await;
        let result = catalog.define_tier(&organizer(), general(event.id, 10)).await;
        assert_eq!(result.err(), Some(TicketError::EventNotFound(event.id)));
    }

    #[tokio::test]
    async fn reserve_and_release_move_availability() {
        let (catalog, org, event) = catalog_with_event().await;
        let tier = catalog.define_tier(&org, general(event.id, 5)).await.unwrap();

        assert_eq!(catalog.reserve(tier.id, 3).await.unwrap().remaining, 2);
        catalog.release(tier.id, 1).await.unwrap();
        assert_eq!(catalog.availability(tier.id).await.unwrap().available, 3);
        assert!(matches!(
            catalog.release(tier.id, 9).await,
            Err(TicketError::CapacityUnderflow { .. })
        ));
    }

    #[tokio::test]
    async fn list_tiers_of_unknown_event_fails() {
        let catalog = Catalog::new(&Stores::in_memory());
        let missing = EventId::new();
        assert_eq!(
            catalog.list_tiers(missing).await.err(),
            Some(TicketError::EventNotFound(missing))
        );
    }
}
