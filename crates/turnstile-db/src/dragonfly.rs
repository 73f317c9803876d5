//! `Dragonfly` (Redis-compatible) agent presence.
//!
//! Heartbeats arrive every few seconds from every device; keeping them out
//! of `PostgreSQL` keeps the hot path off the agents table.
//!
//! # Key Patterns
//!
//! | Pattern | Type | Description |
//! |---------|------|-------------|
//! | `agent:{id}:last_seen` | Integer | Last heartbeat, Unix milliseconds |

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fred::prelude::*;
use turnstile_core::TicketResult;
use turnstile_core::store::PresenceStore;
use turnstile_types::AgentId;

use crate::error::DbError;

/// Presence keys expire after this many seconds without a heartbeat.
const LAST_SEEN_TTL_SECS: i64 = 86_400;

/// Connection handle to a `Dragonfly` instance holding agent presence.
#[derive(Clone)]
pub struct DragonflyPresence {
    client: Client,
}

/// Key holding an agent's last heartbeat.
fn last_seen_key(agent_id: AgentId) -> String {
    format!("agent:{agent_id}:last_seen")
}

impl DragonflyPresence {
    /// Connect to `Dragonfly` at the given URL.
    ///
    /// The URL should follow the Redis URL scheme:
    /// `redis://host:port` or `redis://host:port/db`
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if the URL cannot be parsed.
    /// Returns [`DbError::Dragonfly`] if the connection fails.
    pub async fn connect(url: &str) -> Result<Self, DbError> {
        let config = Config::from_url(url)
            .map_err(|e| DbError::Config(format!("Invalid Dragonfly URL: {e}")))?;

        let client = Builder::from_config(config).build()?;
        client.init().await?;

        tracing::info!("Connected to Dragonfly");
        Ok(Self { client })
    }

    /// Store a heartbeat unless a later one is already recorded.
    pub async fn record(&self, agent_id: AgentId, at: DateTime<Utc>) -> Result<(), DbError> {
        let key = last_seen_key(agent_id);
        let millis = at.timestamp_millis();
        let current: Option<i64> = self.client.get(&key).await?;
        if current.is_some_and(|seen| seen >= millis) {
            return Ok(());
        }
        let _: () = self
            .client
            .set(
                &key,
                millis,
                Some(Expiration::EX(LAST_SEEN_TTL_SECS)),
                None,
                false,
            )
            .await?;
        Ok(())
    }

    /// Read the last heartbeat.
    pub async fn read(&self, agent_id: AgentId) -> Result<Option<DateTime<Utc>>, DbError> {
        let millis: Option<i64> = self.client.get(last_seen_key(agent_id)).await?;
        Ok(millis.and_then(DateTime::from_timestamp_millis))
    }

    /// Close the connection.
    pub async fn quit(&self) -> Result<(), DbError> {
        self.client.quit().await?;
        tracing::info!("Dragonfly connection closed");
        Ok(())
    }
}

#[async_trait]
impl PresenceStore for DragonflyPresence {
    async fn touch(&self, agent_id: AgentId, at: DateTime<Utc>) -> TicketResult<()> {
        self.record(agent_id, at).await.map_err(Into::into)
    }

    async fn last_seen(&self, agent_id: AgentId) -> TicketResult<Option<DateTime<Utc>>> {
        self.read(agent_id).await.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_embeds_agent_id() {
        let id = AgentId::new();
        assert_eq!(last_seen_key(id), format!("agent:{id}:last_seen"));
    }
}
