//! Append-only check-in audit trail.
//!
//! Rows carry their own IDs, so a retried append is a no-op thanks to
//! `ON CONFLICT (id) DO NOTHING`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use turnstile_core::TicketResult;
use turnstile_core::store::AuditStore;
use turnstile_types::{AgentId, CheckinAttempt, OrganizerId};
use uuid::Uuid;

use crate::columns::{outcome_str, parse_outcome, parse_reason, reason_str};
use crate::error::DbError;

/// A row from the `checkin_attempts` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AttemptRow {
    /// Attempt ID.
    pub id: Uuid,
    /// Code as presented.
    pub code: String,
    /// Authenticated agent, if any.
    pub agent_id: Option<Uuid>,
    /// Organizer behind a reversal.
    pub organizer_id: Option<Uuid>,
    /// Event the device was scanning for.
    pub event_id: Uuid,
    /// Outcome column value.
    pub outcome: String,
    /// Denial reason column value.
    pub reason: Option<String>,
    /// Classification timestamp.
    pub recorded_at: DateTime<Utc>,
}

impl TryFrom<AttemptRow> for CheckinAttempt {
    type Error = DbError;

    fn try_from(row: AttemptRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            code: row.code,
            agent_id: row.agent_id.map(AgentId::from),
            organizer_id: row.organizer_id.map(OrganizerId::from),
            event_id: row.event_id.into(),
            outcome: parse_outcome(&row.outcome)?,
            reason: row.reason.as_deref().map(parse_reason).transpose()?,
            recorded_at: row.recorded_at,
        })
    }
}

/// Operations on the `checkin_attempts` table.
#[derive(Clone)]
pub struct PgAuditStore {
    pool: PgPool,
}

impl PgAuditStore {
    /// Create a store bound to a connection pool.
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert one row unless a row with the same ID exists.
    pub async fn insert_attempt(&self, attempt: &CheckinAttempt) -> Result<(), DbError> {
        sqlx::query(
            r"INSERT INTO checkin_attempts (id, code, agent_id, organizer_id, event_id, outcome, reason, recorded_at)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
              ON CONFLICT (id) DO NOTHING",
        )
        .bind(attempt.id.into_inner())
        .bind(&attempt.code)
        .bind(attempt.agent_id.map(AgentId::into_inner))
        .bind(attempt.organizer_id.map(OrganizerId::into_inner))
        .bind(attempt.event_id.into_inner())
        .bind(outcome_str(attempt.outcome))
        .bind(attempt.reason.map(reason_str))
        .bind(attempt.recorded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Every row for a code, oldest first.
    pub async fn fetch_attempts(&self, code: &str) -> Result<Vec<CheckinAttempt>, DbError> {
        sqlx::query_as::<_, AttemptRow>(
            r"SELECT id, code, agent_id, organizer_id, event_id, outcome, reason, recorded_at
              FROM checkin_attempts
              WHERE code = $1
              ORDER BY recorded_at, id",
        )
        .bind(code)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(CheckinAttempt::try_from)
        .collect()
    }
}

#[async_trait]
impl AuditStore for PgAuditStore {
    async fn append(&self, attempt: &CheckinAttempt) -> TicketResult<()> {
        self.insert_attempt(attempt).await.map_err(Into::into)
    }

    async fn attempts_for_code(&self, code: &str) -> TicketResult<Vec<CheckinAttempt>> {
        self.fetch_attempts(code).await.map_err(Into::into)
    }
}
