//! Bookings and ticket units in `PostgreSQL`.
//!
//! A booking and its units are written in the same transaction as the tier
//! reservation, so a failed sale leaves nothing behind. First use of a unit
//! is a conditional `UPDATE ... WHERE checked_in_at IS NULL`; the row lock
//! it takes is what serializes two devices scanning the same code.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use turnstile_core::store::{BookingStore, MarkOutcome};
use turnstile_core::{TicketError, TicketResult};
use turnstile_types::{
    AgentId, Booking, BookingId, Buyer, EventId, EventStats, TicketUnit, UnitCode,
};
use uuid::Uuid;

use crate::catalog_store::{release_on, reserve_on};
use crate::columns::{channel_str, from_db_count, from_db_int, parse_channel, to_db_int};
use crate::error::DbError;

/// Attempts at classifying a refused first-use update before giving up.
///
/// A refused update is normally explained by the row that refused it. Only a
/// reversal landing between the update and the read leaves a unit that is
/// neither used nor voided, and a fresh attempt settles that.
const MARK_ATTEMPTS: u32 = 3;

/// A row from the `bookings` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BookingRow {
    /// Booking ID.
    pub id: Uuid,
    /// Event the booking admits to.
    pub event_id: Uuid,
    /// Tier the units came from.
    pub tier_id: Uuid,
    /// Units sold.
    pub quantity: i32,
    /// Buyer name.
    pub buyer_name: String,
    /// Buyer email or phone.
    pub buyer_contact: String,
    /// `online` or `pos`.
    pub channel: String,
    /// Sale timestamp.
    pub created_at: DateTime<Utc>,
    /// Cancellation timestamp.
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl BookingRow {
    fn into_booking(self, codes: &[String]) -> Result<Booking, DbError> {
        let unit_codes = codes
            .iter()
            .map(String::as_str)
            .map(parse_code)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Booking {
            id: self.id.into(),
            event_id: self.event_id.into(),
            tier_id: self.tier_id.into(),
            quantity: from_db_int(self.quantity, "quantity")?,
            buyer: Buyer {
                name: self.buyer_name,
                contact: self.buyer_contact,
            },
            channel: parse_channel(&self.channel)?,
            created_at: self.created_at,
            unit_codes,
            cancelled_at: self.cancelled_at,
        })
    }
}

/// A row from the `ticket_units` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UnitRow {
    /// The printed code.
    pub code: String,
    /// Parent booking.
    pub booking_id: Uuid,
    /// Event the unit admits to.
    pub event_id: Uuid,
    /// First-use timestamp.
    pub checked_in_at: Option<DateTime<Utc>>,
    /// Agent that recorded first use.
    pub checked_in_by: Option<Uuid>,
    /// Void timestamp.
    pub voided_at: Option<DateTime<Utc>>,
}

impl TryFrom<UnitRow> for TicketUnit {
    type Error = DbError;

    fn try_from(row: UnitRow) -> Result<Self, Self::Error> {
        Ok(Self {
            code: parse_code(&row.code)?,
            booking_id: row.booking_id.into(),
            event_id: row.event_id.into(),
            checked_in_at: row.checked_in_at,
            checked_in_by: row.checked_in_by.map(AgentId::from),
            voided_at: row.voided_at,
        })
    }
}

fn parse_code(raw: &str) -> Result<UnitCode, DbError> {
    UnitCode::parse(raw).map_err(|e| DbError::Corrupt(format!("unit code '{raw}': {e}")))
}

const BOOKING_COLUMNS: &str = "id, event_id, tier_id, quantity, buyer_name, buyer_contact, \
                               channel, created_at, cancelled_at";

const UNIT_COLUMNS: &str =
    "code, booking_id, event_id, checked_in_at, checked_in_by, voided_at";

async fn unit_codes_on(
    conn: &mut PgConnection,
    booking_id: Uuid,
) -> Result<Vec<String>, DbError> {
    let codes =
        sqlx::query_scalar("SELECT code FROM ticket_units WHERE booking_id = $1 ORDER BY position")
            .bind(booking_id)
            .fetch_all(&mut *conn)
            .await?;
    Ok(codes)
}

async fn fetch_unit_on(
    conn: &mut PgConnection,
    code: &UnitCode,
) -> Result<Option<TicketUnit>, DbError> {
    let query = format!("SELECT {UNIT_COLUMNS} FROM ticket_units WHERE code = $1");
    sqlx::query_as::<_, UnitRow>(&query)
        .bind(code.as_str())
        .fetch_optional(&mut *conn)
        .await?
        .map(TicketUnit::try_from)
        .transpose()
}

/// Operations on the `bookings` and `ticket_units` tables.
#[derive(Clone)]
pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    /// Create a store bound to a connection pool.
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Reserve capacity and write the booking and its units in one
    /// transaction.
    pub async fn insert_booking_rows(&self, booking: &Booking) -> Result<(), DbError> {
        let mut tx = self.pool.begin().await?;

        let tier_event: Option<Uuid> =
            sqlx::query_scalar("SELECT event_id FROM ticket_tiers WHERE id = $1")
                .bind(booking.tier_id.into_inner())
                .fetch_optional(&mut *tx)
                .await?;
        if tier_event != Some(booking.event_id.into_inner()) {
            return Err(TicketError::TierNotFound(booking.tier_id).into());
        }

        reserve_on(&mut tx, booking.tier_id, booking.quantity).await?;

        sqlx::query(
            r"INSERT INTO bookings (id, event_id, tier_id, quantity, buyer_name, buyer_contact, channel, created_at, cancelled_at)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(booking.id.into_inner())
        .bind(booking.event_id.into_inner())
        .bind(booking.tier_id.into_inner())
        .bind(to_db_int(booking.quantity, "quantity")?)
        .bind(&booking.buyer.name)
        .bind(&booking.buyer.contact)
        .bind(channel_str(booking.channel))
        .bind(booking.created_at)
        .bind(booking.cancelled_at)
        .execute(&mut *tx)
        .await?;

        let codes: Vec<&str> = booking.unit_codes.iter().map(UnitCode::as_str).collect();
        let positions: Vec<i32> = (1..=booking.unit_codes.len())
            .map(|p| i32::try_from(p).unwrap_or(i32::MAX))
            .collect();

        sqlx::query(
            r"INSERT INTO ticket_units (code, booking_id, event_id, position)
              SELECT code, $3, $4, position FROM UNNEST($1::TEXT[], $2::INTEGER[]) AS u(code, position)",
        )
        .bind(&codes)
        .bind(&positions)
        .bind(booking.id.into_inner())
        .bind(booking.event_id.into_inner())
        .execute(&mut *tx)
        .await
        .map_err(DbError::code_collision_or)?;

        tx.commit().await?;

        tracing::debug!(
            booking_id = %booking.id,
            tier_id = %booking.tier_id,
            quantity = booking.quantity,
            "Inserted booking"
        );
        Ok(())
    }

    /// Fetch one booking with its unit codes.
    pub async fn fetch_booking(&self, id: BookingId) -> Result<Option<Booking>, DbError> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch_booking_on(&mut conn, id.into_inner()).await
    }

    async fn fetch_booking_on(conn: &mut PgConnection, id: Uuid) -> Result<Option<Booking>, DbError> {
        let query = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1");
        let Some(row) = sqlx::query_as::<_, BookingRow>(&query)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
        else {
            return Ok(None);
        };
        let codes = unit_codes_on(conn, id).await?;
        row.into_booking(&codes).map(Some)
    }

    /// Void the units, release the capacity and stamp the booking in one
    /// transaction.
    ///
    /// The booking row and then its unit rows are locked first, so a
    /// concurrent first-use update either lands before (and the cancel
    /// refuses) or re-reads the voided row after (and refuses itself).
    pub async fn cancel_booking_rows(
        &self,
        id: BookingId,
        at: DateTime<Utc>,
    ) -> Result<Booking, DbError> {
        let mut tx = self.pool.begin().await?;

        let query = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1 FOR UPDATE");
        let row = sqlx::query_as::<_, BookingRow>(&query)
            .bind(id.into_inner())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(TicketError::BookingNotFound(id))?;

        if row.cancelled_at.is_some() {
            let codes = unit_codes_on(&mut tx, row.id).await?;
            tx.commit().await?;
            return row.into_booking(&codes);
        }

        let used: Vec<bool> = sqlx::query_scalar(
            r"SELECT checked_in_at IS NOT NULL FROM ticket_units
              WHERE booking_id = $1 ORDER BY position FOR UPDATE",
        )
        .bind(row.id)
        .fetch_all(&mut *tx)
        .await?;
        if used.contains(&true) {
            return Err(TicketError::AlreadyCheckedIn(id).into());
        }

        let quantity = from_db_int(row.quantity, "quantity")?;
        release_on(&mut tx, row.tier_id.into(), quantity).await?;

        sqlx::query("UPDATE ticket_units SET voided_at = $2 WHERE booking_id = $1")
            .bind(row.id)
            .bind(at)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE bookings SET cancelled_at = $2 WHERE id = $1")
            .bind(row.id)
            .bind(at)
            .execute(&mut *tx)
            .await?;

        let codes = unit_codes_on(&mut tx, row.id).await?;
        tx.commit().await?;

        tracing::debug!(booking_id = %id, quantity, "Cancelled booking");
        BookingRow {
            cancelled_at: Some(at),
            ..row
        }
        .into_booking(&codes)
    }

    /// Fetch a unit and its parent booking.
    pub async fn fetch_unit(&self, code: &UnitCode) -> Result<Option<(TicketUnit, Booking)>, DbError> {
        let mut conn = self.pool.acquire().await?;
        let Some(unit) = fetch_unit_on(&mut conn, code).await? else {
            return Ok(None);
        };
        let booking = Self::fetch_booking_on(&mut conn, unit.booking_id.into_inner()).await?;
        Ok(booking.map(|b| (unit, b)))
    }

    /// Flip `checked_in_at` from null to `at`, or report why it could not.
    pub async fn mark_unit(
        &self,
        code: &UnitCode,
        agent_id: AgentId,
        at: DateTime<Utc>,
    ) -> Result<MarkOutcome, DbError> {
        let mut conn = self.pool.acquire().await?;
        let update = format!(
            r"UPDATE ticket_units
              SET checked_in_at = $2, checked_in_by = $3
              WHERE code = $1 AND checked_in_at IS NULL AND voided_at IS NULL
              RETURNING {UNIT_COLUMNS}"
        );

        for _ in 0..MARK_ATTEMPTS {
            let admitted = sqlx::query_as::<_, UnitRow>(&update)
                .bind(code.as_str())
                .bind(at)
                .bind(agent_id.into_inner())
                .fetch_optional(&mut *conn)
                .await?;
            if let Some(row) = admitted {
                return Ok(MarkOutcome::Admitted(TicketUnit::try_from(row)?));
            }

            match fetch_unit_on(&mut conn, code).await? {
                None => return Ok(MarkOutcome::Missing),
                Some(unit) if unit.is_voided() => return Ok(MarkOutcome::Voided(unit)),
                Some(unit) if unit.is_checked_in() => {
                    return Ok(MarkOutcome::AlreadyCheckedIn(unit));
                }
                Some(_) => {
                    tracing::debug!(%code, "Check-in raced a reversal, retrying");
                }
            }
        }

        Err(DbError::Corrupt(format!(
            "unit {code} neither admitted nor classified after {MARK_ATTEMPTS} attempts"
        )))
    }

    /// Clear a recorded check-in, returning the unit as it was before.
    pub async fn reverse_unit(&self, code: &UnitCode) -> Result<Option<TicketUnit>, DbError> {
        let row = sqlx::query_as::<_, UnitRow>(
            r"WITH prev AS (
                  SELECT code, checked_in_at, checked_in_by FROM ticket_units
                  WHERE code = $1 AND checked_in_at IS NOT NULL
                  FOR UPDATE
              )
              UPDATE ticket_units u
              SET checked_in_at = NULL, checked_in_by = NULL
              FROM prev
              WHERE u.code = prev.code
              RETURNING u.code, u.booking_id, u.event_id, prev.checked_in_at, prev.checked_in_by, u.voided_at",
        )
        .bind(code.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(TicketUnit::try_from).transpose()
    }

    /// Issued and checked-in unit counts for an event.
    pub async fn stats_for_event(&self, event_id: EventId) -> Result<EventStats, DbError> {
        let (total_units, checked_in): (i64, i64) = sqlx::query_as(
            r"SELECT
                  COUNT(*) FILTER (WHERE voided_at IS NULL),
                  COUNT(*) FILTER (WHERE checked_in_at IS NOT NULL)
              FROM ticket_units
              WHERE event_id = $1",
        )
        .bind(event_id.into_inner())
        .fetch_one(&self.pool)
        .await?;
        Ok(EventStats {
            total_units: from_db_count(total_units),
            checked_in: from_db_count(checked_in),
        })
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn insert_booking(&self, booking: &Booking) -> TicketResult<()> {
        self.insert_booking_rows(booking).await.map_err(Into::into)
    }

    async fn get_booking(&self, id: BookingId) -> TicketResult<Option<Booking>> {
        self.fetch_booking(id).await.map_err(Into::into)
    }

    async fn cancel_booking(&self, id: BookingId, at: DateTime<Utc>) -> TicketResult<Booking> {
        self.cancel_booking_rows(id, at).await.map_err(Into::into)
    }

    async fn find_unit(&self, code: &UnitCode) -> TicketResult<Option<(TicketUnit, Booking)>> {
        self.fetch_unit(code).await.map_err(Into::into)
    }

    async fn mark_checked_in(
        &self,
        code: &UnitCode,
        agent_id: AgentId,
        at: DateTime<Utc>,
    ) -> TicketResult<MarkOutcome> {
        self.mark_unit(code, agent_id, at).await.map_err(Into::into)
    }

    async fn reverse_checkin(&self, code: &UnitCode) -> TicketResult<Option<TicketUnit>> {
        self.reverse_unit(code).await.map_err(Into::into)
    }

    async fn event_stats(&self, event_id: EventId) -> TicketResult<EventStats> {
        self.stats_for_event(event_id).await.map_err(Into::into)
    }
}
