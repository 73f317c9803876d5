//! Events and ticket tiers in `PostgreSQL`.
//!
//! Capacity is a single `reserved_count` column guarded by a `CHECK`
//! constraint. Reservations and releases are one conditional `UPDATE` each,
//! so concurrent sellers serialize on the row lock and never oversell.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use turnstile_core::store::{EventStore, TierStore};
use turnstile_core::{TicketError, TicketResult};
use turnstile_types::{Availability, Event, EventId, Reservation, TicketTier, TierId};
use uuid::Uuid;

use crate::columns::{from_db_int, to_db_int};
use crate::error::DbError;

/// A row from the `events` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct EventRow {
    /// Event ID.
    pub id: Uuid,
    /// Owning organizer.
    pub organizer_id: Uuid,
    /// Display name.
    pub name: String,
    /// Scheduled start.
    pub starts_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Self {
            id: row.id.into(),
            organizer_id: row.organizer_id.into(),
            name: row.name,
            starts_at: row.starts_at,
            created_at: row.created_at,
        }
    }
}

/// A row from the `ticket_tiers` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TierRow {
    /// Tier ID.
    pub id: Uuid,
    /// Event the tier belongs to.
    pub event_id: Uuid,
    /// Display name.
    pub name: String,
    /// Unit price.
    pub price: Decimal,
    /// Units that may ever be sold.
    pub total_capacity: i32,
    /// Units currently sold.
    pub reserved_count: i32,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl TryFrom<TierRow> for TicketTier {
    type Error = DbError;

    fn try_from(row: TierRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            event_id: row.event_id.into(),
            name: row.name,
            price: row.price,
            total_capacity: from_db_int(row.total_capacity, "total_capacity")?,
            reserved_count: from_db_int(row.reserved_count, "reserved_count")?,
            created_at: row.created_at,
        })
    }
}

const TIER_COLUMNS: &str =
    "id, event_id, name, price, total_capacity, reserved_count, created_at";

/// Remaining units from a `(total_capacity, reserved_count)` pair.
fn remaining(total: i32, reserved: i32) -> Result<u32, DbError> {
    Ok(from_db_int(total, "total_capacity")?
        .saturating_sub(from_db_int(reserved, "reserved_count")?))
}

/// Reserve `quantity` units on an open connection or transaction.
///
/// The increment and the capacity check are the same statement. The guard
/// compares against the headroom, so a quantity near `i32::MAX` cannot
/// overflow the column. When it matches no row, a follow-up read tells a
/// missing tier from a full one.
pub(crate) async fn reserve_on(
    conn: &mut PgConnection,
    tier_id: TierId,
    quantity: u32,
) -> Result<Reservation, DbError> {
    if quantity == 0 {
        return Err(TicketError::InvalidInput(
            "reservation quantity must be positive".to_owned(),
        )
        .into());
    }
    let q = to_db_int(quantity, "quantity")?;

    let updated: Option<(i32, i32)> = sqlx::query_as(
        r"UPDATE ticket_tiers
          SET reserved_count = reserved_count + $2
          WHERE id = $1 AND total_capacity - reserved_count >= $2
          RETURNING total_capacity, reserved_count",
    )
    .bind(tier_id.into_inner())
    .bind(q)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some((total, reserved)) = updated {
        return Ok(Reservation {
            tier_id,
            quantity,
            remaining: remaining(total, reserved)?,
        });
    }

    let current: Option<(i32, i32)> =
        sqlx::query_as("SELECT total_capacity, reserved_count FROM ticket_tiers WHERE id = $1")
            .bind(tier_id.into_inner())
            .fetch_optional(&mut *conn)
            .await?;

    match current {
        None => Err(TicketError::TierNotFound(tier_id).into()),
        Some((total, reserved)) => Err(TicketError::InsufficientStock {
            tier_id,
            requested: quantity,
            available: remaining(total, reserved)?,
        }
        .into()),
    }
}

/// Release `quantity` units on an open connection or transaction.
pub(crate) async fn release_on(
    conn: &mut PgConnection,
    tier_id: TierId,
    quantity: u32,
) -> Result<(), DbError> {
    let q = to_db_int(quantity, "quantity")?;

    let result = sqlx::query(
        r"UPDATE ticket_tiers
          SET reserved_count = reserved_count - $2
          WHERE id = $1 AND reserved_count >= $2",
    )
    .bind(tier_id.into_inner())
    .bind(q)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() > 0 {
        return Ok(());
    }

    let reserved: Option<i32> =
        sqlx::query_scalar("SELECT reserved_count FROM ticket_tiers WHERE id = $1")
            .bind(tier_id.into_inner())
            .fetch_optional(&mut *conn)
            .await?;

    match reserved {
        None => Err(TicketError::TierNotFound(tier_id).into()),
        Some(reserved) => Err(TicketError::CapacityUnderflow {
            tier_id,
            quantity,
            reserved: from_db_int(reserved, "reserved_count")?,
        }
        .into()),
    }
}

/// Operations on the `events` and `ticket_tiers` tables.
#[derive(Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    /// Create a store bound to a connection pool.
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert one event.
    pub async fn insert_event_row(&self, event: &Event) -> Result<(), DbError> {
        sqlx::query(
            r"INSERT INTO events (id, organizer_id, name, starts_at, created_at)
              VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(event.id.into_inner())
        .bind(event.organizer_id.into_inner())
        .bind(&event.name)
        .bind(event.starts_at)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fetch one event.
    pub async fn fetch_event(&self, id: EventId) -> Result<Option<Event>, DbError> {
        let row = sqlx::query_as::<_, EventRow>(
            "SELECT id, organizer_id, name, starts_at, created_at FROM events WHERE id = $1",
        )
        .bind(id.into_inner())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Event::from))
    }

    /// Insert one tier with a zero reserved count.
    pub async fn insert_tier_row(&self, tier: &TicketTier) -> Result<(), DbError> {
        sqlx::query(
            r"INSERT INTO ticket_tiers (id, event_id, name, price, total_capacity, reserved_count, created_at)
              VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(tier.id.into_inner())
        .bind(tier.event_id.into_inner())
        .bind(&tier.name)
        .bind(tier.price)
        .bind(to_db_int(tier.total_capacity, "total_capacity")?)
        .bind(to_db_int(tier.reserved_count, "reserved_count")?)
        .bind(tier.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fetch one tier.
    pub async fn fetch_tier(&self, id: TierId) -> Result<Option<TicketTier>, DbError> {
        let query = format!("SELECT {TIER_COLUMNS} FROM ticket_tiers WHERE id = $1");
        sqlx::query_as::<_, TierRow>(&query)
            .bind(id.into_inner())
            .fetch_optional(&self.pool)
            .await?
            .map(TicketTier::try_from)
            .transpose()
    }

    /// All tiers of an event in creation order.
    pub async fn fetch_tiers(&self, event_id: EventId) -> Result<Vec<TicketTier>, DbError> {
        let query = format!(
            "SELECT {TIER_COLUMNS} FROM ticket_tiers WHERE event_id = $1 ORDER BY created_at, id"
        );
        sqlx::query_as::<_, TierRow>(&query)
            .bind(event_id.into_inner())
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(TicketTier::try_from)
            .collect()
    }

    /// Reserve units in their own statement.
    pub async fn reserve_units(&self, tier_id: TierId, quantity: u32) -> Result<Reservation, DbError> {
        let mut conn = self.pool.acquire().await?;
        let reservation = reserve_on(&mut conn, tier_id, quantity).await?;
        tracing::debug!(%tier_id, quantity, remaining = reservation.remaining, "Reserved tier units");
        Ok(reservation)
    }

    /// Release units in their own statement.
    pub async fn release_units(&self, tier_id: TierId, quantity: u32) -> Result<(), DbError> {
        let mut conn = self.pool.acquire().await?;
        release_on(&mut conn, tier_id, quantity).await?;
        tracing::debug!(%tier_id, quantity, "Released tier units");
        Ok(())
    }
}

#[async_trait]
impl EventStore for PgCatalogStore {
    async fn insert_event(&self, event: &Event) -> TicketResult<()> {
        self.insert_event_row(event).await.map_err(Into::into)
    }

    async fn get_event(&self, id: EventId) -> TicketResult<Option<Event>> {
        self.fetch_event(id).await.map_err(Into::into)
    }
}

#[async_trait]
impl TierStore for PgCatalogStore {
    async fn insert_tier(&self, tier: &TicketTier) -> TicketResult<()> {
        self.insert_tier_row(tier).await.map_err(Into::into)
    }

    async fn get_tier(&self, id: TierId) -> TicketResult<Option<TicketTier>> {
        self.fetch_tier(id).await.map_err(Into::into)
    }

    async fn list_tiers(&self, event_id: EventId) -> TicketResult<Vec<TicketTier>> {
        self.fetch_tiers(event_id).await.map_err(Into::into)
    }

    async fn reserve(&self, tier_id: TierId, quantity: u32) -> TicketResult<Reservation> {
        self.reserve_units(tier_id, quantity).await.map_err(Into::into)
    }

    async fn release(&self, tier_id: TierId, quantity: u32) -> TicketResult<()> {
        self.release_units(tier_id, quantity).await.map_err(Into::into)
    }

    async fn availability(&self, tier_id: TierId) -> TicketResult<Availability> {
        let tier = self
            .fetch_tier(tier_id)
            .await?
            .ok_or(TicketError::TierNotFound(tier_id))?;
        Ok(Availability::from(&tier))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn remaining_is_capacity_minus_reserved() {
        assert_eq!(remaining(10, 4).unwrap(), 6);
        assert_eq!(remaining(3, 3).unwrap(), 0);
        assert!(remaining(-1, 0).is_err());
    }

    #[test]
    fn tier_row_maps_to_domain() {
        let row = TierRow {
            id: Uuid::now_v7(),
            event_id: Uuid::now_v7(),
            name: "VIP".to_owned(),
            price: Decimal::new(12000, 2),
            total_capacity: 2,
            reserved_count: 1,
            created_at: Utc::now(),
        };
        let tier = TicketTier::try_from(row.clone()).unwrap();
        assert_eq!(tier.id.into_inner(), row.id);
        assert_eq!(tier.available(), 1);
    }

    #[test]
    fn negative_counts_are_rejected() {
        let row = TierRow {
            id: Uuid::now_v7(),
            event_id: Uuid::now_v7(),
            name: "Broken".to_owned(),
            price: Decimal::ZERO,
            total_capacity: 5,
            reserved_count: -2,
            created_at: Utc::now(),
        };
        assert!(matches!(TicketTier::try_from(row), Err(DbError::Corrupt(_))));
    }
}
