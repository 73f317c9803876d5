//! Agent credentials and `PostgreSQL`-backed presence.
//!
//! Scope is stored as an `all_events` flag plus a `UUID[]` of event IDs.
//! Access codes are unique at the schema level; a clash surfaces as
//! [`turnstile_core::TicketError::CodeCollision`] so the caller can draw a fresh code.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use turnstile_core::TicketResult;
use turnstile_core::store::{AgentStore, PresenceStore};
use turnstile_types::{Agent, AgentId, AgentScope, AgentStatus, EventId, OrganizerId};
use uuid::Uuid;

use crate::columns::{parse_status, status_str};
use crate::error::DbError;

/// A row from the `agents` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AgentRow {
    /// Agent ID.
    pub id: Uuid,
    /// Issuing organizer.
    pub organizer_id: Uuid,
    /// Display name.
    pub display_name: String,
    /// Current access code.
    pub access_code: String,
    /// `active` or `blocked`.
    pub status: String,
    /// Whether the agent may scan every event of its organizer.
    pub all_events: bool,
    /// Scoped events when `all_events` is false.
    pub event_ids: Vec<Uuid>,
    /// Last heartbeat.
    pub last_seen_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl TryFrom<AgentRow> for Agent {
    type Error = DbError;

    fn try_from(row: AgentRow) -> Result<Self, Self::Error> {
        let scope = if row.all_events {
            AgentScope::AllEvents
        } else {
            AgentScope::Events(row.event_ids.into_iter().map(EventId::from).collect())
        };
        Ok(Self {
            id: row.id.into(),
            organizer_id: row.organizer_id.into(),
            display_name: row.display_name,
            access_code: row.access_code,
            status: parse_status(&row.status)?,
            scope,
            last_seen_at: row.last_seen_at,
            created_at: row.created_at,
        })
    }
}

/// Split a scope into its `(all_events, event_ids)` columns.
fn scope_columns(scope: &AgentScope) -> (bool, Vec<Uuid>) {
    match scope {
        AgentScope::AllEvents => (true, Vec::new()),
        AgentScope::Events(ids) => (false, ids.iter().copied().map(EventId::into_inner).collect()),
    }
}

const AGENT_COLUMNS: &str = "id, organizer_id, display_name, access_code, status, all_events, \
                             event_ids, last_seen_at, created_at";

/// Operations on the `agents` table.
#[derive(Clone)]
pub struct PgAgentStore {
    pool: PgPool,
}

impl PgAgentStore {
    /// Create a store bound to a connection pool.
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert one agent.
    pub async fn insert_agent_row(&self, agent: &Agent) -> Result<(), DbError> {
        let (all_events, event_ids) = scope_columns(&agent.scope);
        sqlx::query(
            r"INSERT INTO agents (id, organizer_id, display_name, access_code, status, all_events, event_ids, last_seen_at, created_at)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(agent.id.into_inner())
        .bind(agent.organizer_id.into_inner())
        .bind(&agent.display_name)
        .bind(&agent.access_code)
        .bind(status_str(agent.status))
        .bind(all_events)
        .bind(&event_ids)
        .bind(agent.last_seen_at)
        .bind(agent.created_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::code_collision_or)?;
        Ok(())
    }

    /// Fetch one agent by ID.
    pub async fn fetch_agent(&self, id: AgentId) -> Result<Option<Agent>, DbError> {
        let query = format!("SELECT {AGENT_COLUMNS} FROM agents WHERE id = $1");
        sqlx::query_as::<_, AgentRow>(&query)
            .bind(id.into_inner())
            .fetch_optional(&self.pool)
            .await?
            .map(Agent::try_from)
            .transpose()
    }

    /// Fetch the agent currently holding an access code.
    pub async fn fetch_by_access_code(&self, access_code: &str) -> Result<Option<Agent>, DbError> {
        let query = format!("SELECT {AGENT_COLUMNS} FROM agents WHERE access_code = $1");
        sqlx::query_as::<_, AgentRow>(&query)
            .bind(access_code)
            .fetch_optional(&self.pool)
            .await?
            .map(Agent::try_from)
            .transpose()
    }

    /// All agents of an organizer in creation order.
    pub async fn fetch_agents(&self, organizer_id: OrganizerId) -> Result<Vec<Agent>, DbError> {
        let query = format!(
            "SELECT {AGENT_COLUMNS} FROM agents WHERE organizer_id = $1 ORDER BY created_at, id"
        );
        sqlx::query_as::<_, AgentRow>(&query)
            .bind(organizer_id.into_inner())
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Agent::try_from)
            .collect()
    }

    /// Overwrite the scope columns.
    pub async fn set_scope(&self, id: AgentId, scope: &AgentScope) -> Result<Option<Agent>, DbError> {
        let (all_events, event_ids) = scope_columns(scope);
        let query = format!(
            "UPDATE agents SET all_events = $2, event_ids = $3 WHERE id = $1 RETURNING {AGENT_COLUMNS}"
        );
        sqlx::query_as::<_, AgentRow>(&query)
            .bind(id.into_inner())
            .bind(all_events)
            .bind(&event_ids)
            .fetch_optional(&self.pool)
            .await?
            .map(Agent::try_from)
            .transpose()
    }

    /// Overwrite the status column.
    pub async fn set_status(&self, id: AgentId, status: AgentStatus) -> Result<Option<Agent>, DbError> {
        let query =
            format!("UPDATE agents SET status = $2 WHERE id = $1 RETURNING {AGENT_COLUMNS}");
        sqlx::query_as::<_, AgentRow>(&query)
            .bind(id.into_inner())
            .bind(status_str(status))
            .fetch_optional(&self.pool)
            .await?
            .map(Agent::try_from)
            .transpose()
    }

    /// Swap the access code.
    pub async fn set_access_code(&self, id: AgentId, access_code: &str) -> Result<Option<Agent>, DbError> {
        let query =
            format!("UPDATE agents SET access_code = $2 WHERE id = $1 RETURNING {AGENT_COLUMNS}");
        sqlx::query_as::<_, AgentRow>(&query)
            .bind(id.into_inner())
            .bind(access_code)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::code_collision_or)?
            .map(Agent::try_from)
            .transpose()
    }

    /// Delete one agent. Audit rows keep their `agent_id`.
    pub async fn remove_agent(&self, id: AgentId) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM agents WHERE id = $1")
            .bind(id.into_inner())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AgentStore for PgAgentStore {
    async fn insert_agent(&self, agent: &Agent) -> TicketResult<()> {
        self.insert_agent_row(agent).await.map_err(Into::into)
    }

    async fn get_agent(&self, id: AgentId) -> TicketResult<Option<Agent>> {
        self.fetch_agent(id).await.map_err(Into::into)
    }

    async fn find_by_access_code(&self, access_code: &str) -> TicketResult<Option<Agent>> {
        self.fetch_by_access_code(access_code).await.map_err(Into::into)
    }

    async fn list_agents(&self, organizer_id: OrganizerId) -> TicketResult<Vec<Agent>> {
        self.fetch_agents(organizer_id).await.map_err(Into::into)
    }

    async fn update_scope(&self, id: AgentId, scope: &AgentScope) -> TicketResult<Option<Agent>> {
        self.set_scope(id, scope).await.map_err(Into::into)
    }

    async fn update_status(
        &self,
        id: AgentId,
        status: AgentStatus,
    ) -> TicketResult<Option<Agent>> {
        self.set_status(id, status).await.map_err(Into::into)
    }

    async fn replace_access_code(
        &self,
        id: AgentId,
        access_code: &str,
    ) -> TicketResult<Option<Agent>> {
        self.set_access_code(id, access_code).await.map_err(Into::into)
    }

    async fn delete_agent(&self, id: AgentId) -> TicketResult<bool> {
        self.remove_agent(id).await.map_err(Into::into)
    }
}

/// Heartbeats stored in `agents.last_seen_at`.
///
/// Used when no `Dragonfly` instance is configured. The timestamp only ever
/// moves forward.
#[derive(Clone)]
pub struct PgPresence {
    pool: PgPool,
}

impl PgPresence {
    /// Create a presence store bound to a connection pool.
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PresenceStore for PgPresence {
    async fn touch(&self, agent_id: AgentId, at: DateTime<Utc>) -> TicketResult<()> {
        sqlx::query(
            "UPDATE agents SET last_seen_at = GREATEST(last_seen_at, $2) WHERE id = $1",
        )
        .bind(agent_id.into_inner())
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;
        Ok(())
    }

    async fn last_seen(&self, agent_id: AgentId) -> TicketResult<Option<DateTime<Utc>>> {
        let seen: Option<Option<DateTime<Utc>>> =
            sqlx::query_scalar("SELECT last_seen_at FROM agents WHERE id = $1")
                .bind(agent_id.into_inner())
                .fetch_optional(&self.pool)
                .await
                .map_err(DbError::from)?;
        Ok(seen.flatten())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn row(all_events: bool, event_ids: Vec<Uuid>) -> AgentRow {
        AgentRow {
            id: Uuid::now_v7(),
            organizer_id: Uuid::now_v7(),
            display_name: "Mobile 1".to_owned(),
            access_code: "QX7M2K9P".to_owned(),
            status: "active".to_owned(),
            all_events,
            event_ids,
            last_seen_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn all_events_flag_wins_over_ids() {
        let agent = Agent::try_from(row(true, vec![Uuid::now_v7()])).unwrap();
        assert_eq!(agent.scope, AgentScope::AllEvents);
    }

    #[test]
    fn scoped_ids_map_to_event_set() {
        let event = Uuid::now_v7();
        let agent = Agent::try_from(row(false, vec![event, event])).unwrap();
        assert_eq!(
            agent.scope,
            AgentScope::Events(BTreeSet::from([EventId::from(event)]))
        );
    }

    #[test]
    fn scope_columns_round_trip_through_row() {
        let events = BTreeSet::from([EventId::new(), EventId::new()]);
        let (all_events, ids) = scope_columns(&AgentScope::Events(events.clone()));
        assert!(!all_events);
        let agent = Agent::try_from(row(all_events, ids)).unwrap();
        assert_eq!(agent.scope, AgentScope::Events(events));
    }

    #[test]
    fn unknown_status_is_corrupt() {
        let mut bad = row(true, Vec::new());
        bad.status = "paused".to_owned();
        assert!(matches!(Agent::try_from(bad), Err(DbError::Corrupt(_))));
    }
}
