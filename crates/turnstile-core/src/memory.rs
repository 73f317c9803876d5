//! In-process storage backend.
//!
//! Each tier and each unit sits behind its own [`Mutex`], so a reservation
//! only waits on other reservations of the same tier and a check-in only
//! waits on other scans of the same code. The outer maps are behind
//! [`RwLock`]s that are held just long enough to clone an [`Arc`] handle.
//!
//! Lock order, where more than one lock is held at a time:
//!
//! ```text
//! insert_booking:  tier -> units map (write) -> bookings map (write)
//! cancel_booking:  booking -> unit, unit, ... -> tier
//! ```
//!
//! No path holds a map guard while waiting on an entity lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use turnstile_types::{
    Agent, AgentId, AgentScope, AgentStatus, Availability, Booking, BookingId, CheckinAttempt,
    Event, EventId, EventStats, OrganizerId, Reservation, TicketTier, TicketUnit, TierId,
    UnitCode,
};

use crate::error::{TicketError, TicketResult};
use crate::store::{
    AgentStore, AuditStore, BookingStore, EventStore, MarkOutcome, PresenceStore, TierStore,
};

/// Per-event counters maintained alongside the unit map.
#[derive(Debug, Default)]
struct EventCounters {
    issued: AtomicU64,
    checked_in: AtomicU64,
}

impl EventCounters {
    fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::AcqRel);
    }

    fn sub(counter: &AtomicU64, n: u64) {
        // Saturates at zero; the counters are display data.
        let _ = counter.fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
            Some(v.saturating_sub(n))
        });
    }
}

#[derive(Debug, Default)]
struct AgentTable {
    by_id: HashMap<AgentId, Agent>,
    by_code: HashMap<String, AgentId>,
}

/// Every storage trait implemented over in-process maps.
#[derive(Debug, Default)]
pub struct MemoryStore {
    events: RwLock<HashMap<EventId, Event>>,
    tiers: RwLock<HashMap<TierId, Arc<Mutex<TicketTier>>>>,
    bookings: RwLock<HashMap<BookingId, Arc<Mutex<Booking>>>>,
    units: RwLock<HashMap<UnitCode, Arc<Mutex<TicketUnit>>>>,
    counters: RwLock<HashMap<EventId, Arc<EventCounters>>>,
    agents: RwLock<AgentTable>,
    presence: RwLock<HashMap<AgentId, DateTime<Utc>>>,
    audit: Mutex<Vec<CheckinAttempt>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    async fn tier_handle(&self, id: TierId) -> TicketResult<Arc<Mutex<TicketTier>>> {
        self.tiers
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(TicketError::TierNotFound(id))
    }

    async fn unit_handle(&self, code: &UnitCode) -> Option<Arc<Mutex<TicketUnit>>> {
        self.units.read().await.get(code).cloned()
    }

    async fn counters(&self, event_id: EventId) -> Arc<EventCounters> {
        if let Some(counters) = self.counters.read().await.get(&event_id) {
            return Arc::clone(counters);
        }
        Arc::clone(self.counters.write().await.entry(event_id).or_default())
    }
}

/// Check and increment under the tier's lock.
fn reserve_locked(tier: &mut TicketTier, quantity: u32) -> TicketResult<Reservation> {
    if quantity == 0 {
        return Err(TicketError::InvalidInput(
            "reservation quantity must be positive".to_owned(),
        ));
    }
    if !tier.can_reserve(quantity) {
        return Err(TicketError::InsufficientStock {
            tier_id: tier.id,
            requested: quantity,
            available: tier.available(),
        });
    }
    tier.reserved_count = tier.reserved_count.saturating_add(quantity);
    Ok(Reservation {
        tier_id: tier.id,
        quantity,
        remaining: tier.available(),
    })
}

/// Decrement under the tier's lock, refusing to go below zero.
fn release_locked(tier: &mut TicketTier, quantity: u32) -> TicketResult<()> {
    let Some(next) = tier.reserved_count.checked_sub(quantity) else {
        return Err(TicketError::CapacityUnderflow {
            tier_id: tier.id,
            quantity,
            reserved: tier.reserved_count,
        });
    };
    tier.reserved_count = next;
    Ok(())
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn insert_event(&self, event: &Event) -> TicketResult<()> {
        self.events.write().await.insert(event.id, event.clone());
        Ok(())
    }

    async fn get_event(&self, id: EventId) -> TicketResult<Option<Event>> {
        Ok(self.events.read().await.get(&id).cloned())
    }
}

#[async_trait]
impl TierStore for MemoryStore {
    async fn insert_tier(&self, tier: &TicketTier) -> TicketResult<()> {
        self.tiers
            .write()
            .await
            .insert(tier.id, Arc::new(Mutex::new(tier.clone())));
        Ok(())
    }

    async fn get_tier(&self, id: TierId) -> TicketResult<Option<TicketTier>> {
        let Some(handle) = self.tiers.read().await.get(&id).cloned() else {
            return Ok(None);
        };
        let tier = handle.lock().await.clone();
        Ok(Some(tier))
    }

    async fn list_tiers(&self, event_id: EventId) -> TicketResult<Vec<TicketTier>> {
        let handles: Vec<_> = self.tiers.read().await.values().cloned().collect();
        let mut tiers = Vec::new();
        for handle in handles {
            let tier = handle.lock().await;
            if tier.event_id == event_id {
                tiers.push(tier.clone());
            }
        }
        tiers.sort_by_key(|t| (t.created_at, t.id));
        Ok(tiers)
    }

    async fn reserve(&self, tier_id: TierId, quantity: u32) -> TicketResult<Reservation> {
        let handle = self.tier_handle(tier_id).await?;
        let mut tier = handle.lock().await;
        reserve_locked(&mut tier, quantity)
    }

    async fn release(&self, tier_id: TierId, quantity: u32) -> TicketResult<()> {
        let handle = self.tier_handle(tier_id).await?;
        let mut tier = handle.lock().await;
        release_locked(&mut tier, quantity)
    }

    async fn availability(&self, tier_id: TierId) -> TicketResult<Availability> {
        let handle = self.tier_handle(tier_id).await?;
        let tier = handle.lock().await;
        Ok(Availability::from(&*tier))
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn insert_booking(&self, booking: &Booking) -> TicketResult<()> {
        let handle = self.tier_handle(booking.tier_id).await?;
        let mut tier = handle.lock().await;

        if tier.event_id != booking.event_id {
            return Err(TicketError::TierNotFound(booking.tier_id));
        }
        if !tier.can_reserve(booking.quantity) {
            return Err(TicketError::InsufficientStock {
                tier_id: tier.id,
                requested: booking.quantity,
                available: tier.available(),
            });
        }

        {
            let mut units = self.units.write().await;
            let distinct: HashSet<&UnitCode> = booking.unit_codes.iter().collect();
            if distinct.len() != booking.unit_codes.len()
                || booking.unit_codes.iter().any(|c| units.contains_key(c))
            {
                return Err(TicketError::CodeCollision);
            }

            // The booking goes in first so a unit never resolves without
            // its parent.
            self.bookings
                .write()
                .await
                .insert(booking.id, Arc::new(Mutex::new(booking.clone())));

            for code in &booking.unit_codes {
                let unit = TicketUnit {
                    code: code.clone(),
                    booking_id: booking.id,
                    event_id: booking.event_id,
                    checked_in_at: None,
                    checked_in_by: None,
                    voided_at: None,
                };
                units.insert(code.clone(), Arc::new(Mutex::new(unit)));
            }
        }

        reserve_locked(&mut tier, booking.quantity)?;
        drop(tier);

        let counters = self.counters(booking.event_id).await;
        EventCounters::add(&counters.issued, u64::from(booking.quantity));
        Ok(())
    }

    async fn get_booking(&self, id: BookingId) -> TicketResult<Option<Booking>> {
        let Some(handle) = self.bookings.read().await.get(&id).cloned() else {
            return Ok(None);
        };
        let booking = handle.lock().await.clone();
        Ok(Some(booking))
    }

    async fn cancel_booking(&self, id: BookingId, at: DateTime<Utc>) -> TicketResult<Booking> {
        let handle = self
            .bookings
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(TicketError::BookingNotFound(id))?;
        let mut booking = handle.lock().await;
        if booking.is_cancelled() {
            return Ok(booking.clone());
        }

        let unit_handles: Vec<Arc<Mutex<TicketUnit>>> = {
            let units = self.units.read().await;
            booking
                .unit_codes
                .iter()
                .filter_map(|c| units.get(c).cloned())
                .collect()
        };
        let mut guards = Vec::with_capacity(unit_handles.len());
        for unit in &unit_handles {
            guards.push(unit.lock().await);
        }
        if guards.iter().any(|u| u.is_checked_in()) {
            return Err(TicketError::AlreadyCheckedIn(id));
        }

        let tier_handle = self.tier_handle(booking.tier_id).await?;
        let mut tier = tier_handle.lock().await;
        release_locked(&mut tier, booking.quantity)?;
        drop(tier);

        for unit in &mut guards {
            unit.voided_at = Some(at);
        }
        booking.cancelled_at = Some(at);
        drop(guards);

        let counters = self.counters(booking.event_id).await;
        EventCounters::sub(&counters.issued, u64::from(booking.quantity));
        Ok(booking.clone())
    }

    async fn find_unit(&self, code: &UnitCode) -> TicketResult<Option<(TicketUnit, Booking)>> {
        let Some(handle) = self.unit_handle(code).await else {
            return Ok(None);
        };
        let unit = handle.lock().await.clone();
        let Some(booking) = self.get_booking(unit.booking_id).await? else {
            return Ok(None);
        };
        Ok(Some((unit, booking)))
    }

    async fn mark_checked_in(
        &self,
        code: &UnitCode,
        agent_id: AgentId,
        at: DateTime<Utc>,
    ) -> TicketResult<MarkOutcome> {
        let Some(handle) = self.unit_handle(code).await else {
            return Ok(MarkOutcome::Missing);
        };
        let mut unit = handle.lock().await;
        if unit.is_voided() {
            return Ok(MarkOutcome::Voided(unit.clone()));
        }
        if unit.is_checked_in() {
            return Ok(MarkOutcome::AlreadyCheckedIn(unit.clone()));
        }
        unit.checked_in_at = Some(at);
        unit.checked_in_by = Some(agent_id);
        let admitted = unit.clone();
        drop(unit);

        let counters = self.counters(admitted.event_id).await;
        EventCounters::add(&counters.checked_in, 1);
        Ok(MarkOutcome::Admitted(admitted))
    }

    async fn reverse_checkin(&self, code: &UnitCode) -> TicketResult<Option<TicketUnit>> {
        let Some(handle) = self.unit_handle(code).await else {
            return Ok(None);
        };
        let mut unit = handle.lock().await;
        if !unit.is_checked_in() {
            return Ok(None);
        }
        let before = unit.clone();
        unit.checked_in_at = None;
        unit.checked_in_by = None;
        drop(unit);

        let counters = self.counters(before.event_id).await;
        EventCounters::sub(&counters.checked_in, 1);
        Ok(Some(before))
    }

    async fn event_stats(&self, event_id: EventId) -> TicketResult<EventStats> {
        let counters = self.counters(event_id).await;
        Ok(EventStats {
            total_units: counters.issued.load(Ordering::Acquire),
            checked_in: counters.checked_in.load(Ordering::Acquire),
        })
    }
}

#[async_trait]
impl AgentStore for MemoryStore {
    async fn insert_agent(&self, agent: &Agent) -> TicketResult<()> {
        let mut table = self.agents.write().await;
        if table.by_code.contains_key(&agent.access_code) {
            return Err(TicketError::CodeCollision);
        }
        table.by_code.insert(agent.access_code.clone(), agent.id);
        table.by_id.insert(agent.id, agent.clone());
        Ok(())
    }

    async fn get_agent(&self, id: AgentId) -> TicketResult<Option<Agent>> {
        Ok(self.agents.read().await.by_id.get(&id).cloned())
    }

    async fn find_by_access_code(&self, access_code: &str) -> TicketResult<Option<Agent>> {
        let table = self.agents.read().await;
        Ok(table
            .by_code
            .get(access_code)
            .and_then(|id| table.by_id.get(id))
            .cloned())
    }

    async fn list_agents(&self, organizer_id: OrganizerId) -> TicketResult<Vec<Agent>> {
        let mut agents: Vec<Agent> = self
            .agents
            .read()
            .await
            .by_id
            .values()
            .filter(|a| a.organizer_id == organizer_id)
            .cloned()
            .collect();
        agents.sort_by_key(|a| (a.created_at, a.id));
        Ok(agents)
    }

    async fn update_scope(&self, id: AgentId, scope: &AgentScope) -> TicketResult<Option<Agent>> {
        let mut table = self.agents.write().await;
        Ok(table.by_id.get_mut(&id).map(|agent| {
            agent.scope = scope.clone();
            agent.clone()
        }))
    }

    async fn update_status(
        &self,
        id: AgentId,
        status: AgentStatus,
    ) -> TicketResult<Option<Agent>> {
        let mut table = self.agents.write().await;
        Ok(table.by_id.get_mut(&id).map(|agent| {
            agent.status = status;
            agent.clone()
        }))
    }

    async fn replace_access_code(
        &self,
        id: AgentId,
        access_code: &str,
    ) -> TicketResult<Option<Agent>> {
        let mut table = self.agents.write().await;
        if table.by_code.contains_key(access_code) {
            return Err(TicketError::CodeCollision);
        }
        let Some(agent) = table.by_id.get_mut(&id) else {
            return Ok(None);
        };
        let old = std::mem::replace(&mut agent.access_code, access_code.to_owned());
        let updated = agent.clone();
        table.by_code.remove(&old);
        table.by_code.insert(access_code.to_owned(), id);
        Ok(Some(updated))
    }

    async fn delete_agent(&self, id: AgentId) -> TicketResult<bool> {
        let mut table = self.agents.write().await;
        let Some(agent) = table.by_id.remove(&id) else {
            return Ok(false);
        };
        table.by_code.remove(&agent.access_code);
        drop(table);
        self.presence.write().await.remove(&id);
        Ok(true)
    }
}

#[async_trait]
impl PresenceStore for MemoryStore {
    async fn touch(&self, agent_id: AgentId, at: DateTime<Utc>) -> TicketResult<()> {
        let mut presence = self.presence.write().await;
        let seen = presence.entry(agent_id).or_insert(at);
        if at > *seen {
            *seen = at;
        }
        Ok(())
    }

    async fn last_seen(&self, agent_id: AgentId) -> TicketResult<Option<DateTime<Utc>>> {
        Ok(self.presence.read().await.get(&agent_id).copied())
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn append(&self, attempt: &CheckinAttempt) -> TicketResult<()> {
        let mut rows = self.audit.lock().await;
        if !rows.iter().any(|row| row.id == attempt.id) {
            rows.push(attempt.clone());
        }
        Ok(())
    }

    async fn attempts_for_code(&self, code: &str) -> TicketResult<Vec<CheckinAttempt>> {
        Ok(self
            .audit
            .lock()
            .await
            .iter()
            .filter(|row| row.code == code)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use turnstile_types::{Buyer, SalesChannel};

    fn tier(event_id: EventId, capacity: u32) -> TicketTier {
        TicketTier {
            id: TierId::new(),
            event_id,
            name: "General".to_owned(),
            price: Decimal::new(4000, 2),
            total_capacity: capacity,
            reserved_count: 0,
            created_at: Utc::now(),
        }
    }

    fn booking(tier: &TicketTier, codes: &[&str]) -> Booking {
        let unit_codes: Vec<UnitCode> = codes.iter().filter_map(|c| UnitCode::parse(c).ok()).collect();
        Booking {
            id: BookingId::new(),
            event_id: tier.event_id,
            tier_id: tier.id,
            quantity: u32::try_from(unit_codes.len()).unwrap_or(u32::MAX),
            buyer: Buyer {
                name: "Ada".to_owned(),
                contact: "ada@example.com".to_owned(),
            },
            channel: SalesChannel::Online,
            created_at: Utc::now(),
            unit_codes,
            cancelled_at: None,
        }
    }

    #[tokio::test]
    async fn reserve_refuses_past_capacity() {
        let store = MemoryStore::new();
        let t = tier(EventId::new(), 3);
        store.insert_tier(&t).await.ok();

        assert!(store.reserve(t.id, 2).await.is_ok());
        let err = store.reserve(t.id, 2).await.err();
        assert!(matches!(
            err,
            Some(TicketError::InsufficientStock { available: 1, .. })
        ));
        let avail = store.availability(t.id).await.ok();
        assert_eq!(avail.map(|a| a.available), Some(1));
    }

    #[tokio::test]
    async fn release_below_zero_is_a_fault() {
        let store = MemoryStore::new();
        let t = tier(EventId::new(), 3);
        store.insert_tier(&t).await.ok();
        store.reserve(t.id, 1).await.ok();

        let err = store.release(t.id, 2).await.err();
        assert!(matches!(err, Some(TicketError::CapacityUnderflow { .. })));
        let avail = store.availability(t.id).await.ok();
        assert_eq!(avail.map(|a| a.available), Some(2));
    }

    #[tokio::test]
    async fn colliding_booking_leaves_no_trace() {
        let store = MemoryStore::new();
        let t = tier(EventId::new(), 10);
        store.insert_tier(&t).await.ok();
        assert!(store.insert_booking(&booking(&t, &["AAAA1111"])).await.is_ok());

        let clash = booking(&t, &["BBBB2222", "AAAA1111"]);
        let err = store.insert_booking(&clash).await.err();
        assert_eq!(err, Some(TicketError::CodeCollision));

        let code = UnitCode::parse("BBBB2222").ok();
        if let Some(code) = code {
            assert!(matches!(store.find_unit(&code).await, Ok(None)));
        }
        assert!(matches!(store.get_booking(clash.id).await, Ok(None)));
        let avail = store.availability(t.id).await.ok();
        assert_eq!(avail.map(|a| a.available), Some(9));
    }

    #[tokio::test]
    async fn mark_is_test_and_set() {
        let store = MemoryStore::new();
        let t = tier(EventId::new(), 10);
        store.insert_tier(&t).await.ok();
        let b = booking(&t, &["CODE0001"]);
        store.insert_booking(&b).await.ok();
        let Some(code) = b.unit_codes.first().cloned() else {
            return;
        };

        let first = AgentId::new();
        let at = Utc::now();
        let a = store.mark_checked_in(&code, first, at).await.ok();
        assert!(matches!(a, Some(MarkOutcome::Admitted(_))));

        let b2 = store.mark_checked_in(&code, AgentId::new(), Utc::now()).await.ok();
        match b2 {
            Some(MarkOutcome::AlreadyCheckedIn(unit)) => {
                assert_eq!(unit.checked_in_by, Some(first));
                assert_eq!(unit.checked_in_at, Some(at));
            }
            other => assert!(other.is_none(), "unexpected outcome {other:?}"),
        }

        let stats = store.event_stats(t.event_id).await.ok();
        assert_eq!(stats.map(|s| s.checked_in), Some(1));
    }

    #[tokio::test]
    async fn access_code_swap_invalidates_old_code() {
        let store = MemoryStore::new();
        let agent = Agent {
            id: AgentId::new(),
            organizer_id: OrganizerId::new(),
            display_name: "Gate A".to_owned(),
            access_code: "OLDCODE".to_owned(),
            status: AgentStatus::Active,
            scope: AgentScope::AllEvents,
            last_seen_at: None,
            created_at: Utc::now(),
        };
        store.insert_agent(&agent).await.ok();
        store.replace_access_code(agent.id, "NEWCODE").await.ok();

        assert!(matches!(store.find_by_access_code("OLDCODE").await, Ok(None)));
        let found = store.find_by_access_code("NEWCODE").await.ok().flatten();
        assert_eq!(found.map(|a| a.id), Some(agent.id));
    }

    #[tokio::test]
    async fn audit_append_is_idempotent() {
        let store = MemoryStore::new();
        let attempt = CheckinAttempt {
            id: turnstile_types::AttemptId::new(),
            code: "CODE0001".to_owned(),
            agent_id: None,
            organizer_id: None,
            event_id: EventId::new(),
            outcome: turnstile_types::CheckinOutcome::NotFound,
            reason: None,
            recorded_at: Utc::now(),
        };
        store.append(&attempt).await.ok();
        store.append(&attempt).await.ok();
        let rows = store.attempts_for_code("CODE0001").await.unwrap_or_default();
        assert_eq!(rows.len(), 1);
    }
}
