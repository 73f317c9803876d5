//! Agent access control: scanning credentials, their scope and presence.
//!
//! [`AgentAccess::authorize`] reads the agent afresh on every call. Nothing
//! is cached, so blocking an agent or regenerating its code takes effect on
//! the very next scan.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info, warn};
use turnstile_types::{
    Agent, AgentId, AgentListing, AgentRef, AgentScope, AgentStatus, EventId,
};

use crate::catalog::validate_name;
use crate::codes::CodeGenerator;
use crate::config::TurnstileConfig;
use crate::error::{TicketError, TicketResult};
use crate::principal::Organizer;
use crate::store::{AgentStore, EventStore, PresenceStore, Stores};

/// Issues, scopes and checks scanning credentials.
#[derive(Clone)]
pub struct AgentAccess {
    agents: Arc<dyn AgentStore>,
    presence: Arc<dyn PresenceStore>,
    events: Arc<dyn EventStore>,
    codes: Arc<dyn CodeGenerator>,
    max_generation_attempts: u32,
    online_window: TimeDelta,
}

impl AgentAccess {
    /// Build the service over the given stores.
    pub fn new(stores: &Stores, codes: Arc<dyn CodeGenerator>, config: &TurnstileConfig) -> Self {
        Self {
            agents: Arc::clone(&stores.agents),
            presence: Arc::clone(&stores.presence),
            events: Arc::clone(&stores.events),
            codes,
            max_generation_attempts: config.codes.max_generation_attempts.max(1),
            online_window: config.agents.online_window(),
        }
    }

    /// Issue a credential with a fresh access code.
    ///
    /// The scope defaults to all of the organizer's events.
    pub async fn create_agent(
        &self,
        organizer: &Organizer,
        display_name: &str,
        scope: Option<AgentScope>,
    ) -> TicketResult<Agent> {
        let scope = scope.unwrap_or_default();
        self.check_scope(organizer, &scope).await?;
        let mut agent = Agent {
            id: AgentId::new(),
            organizer_id: organizer.organizer_id,
            display_name: validate_name("agent name", display_name)?,
            access_code: String::new(),
            status: AgentStatus::Active,
            scope,
            last_seen_at: None,
            created_at: Utc::now(),
        };

        for attempt in 1..=self.max_generation_attempts {
            agent.access_code = self.codes.access_code();
            match self.agents.insert_agent(&agent).await {
                Ok(()) => {
                    info!(agent_id = %agent.id, organizer_id = %agent.organizer_id, "Agent created");
                    return Ok(agent);
                }
                Err(TicketError::CodeCollision) => {
                    warn!(agent_id = %agent.id, attempt, "Access code collision, drawing again");
                }
                Err(err) => return Err(err),
            }
        }
        Err(TicketError::CodeSpaceExhausted(self.max_generation_attempts))
    }

    /// Narrow or widen the events an agent may scan for.
    pub async fn set_scope(
        &self,
        organizer: &Organizer,
        agent_id: AgentId,
        scope: AgentScope,
    ) -> TicketResult<Agent> {
        self.owned_agent(organizer, agent_id).await?;
        self.check_scope(organizer, &scope).await?;
        let agent = self
            .agents
            .update_scope(agent_id, &scope)
            .await?
            .ok_or(TicketError::AgentNotFound(agent_id))?;
        info!(%agent_id, scope = ?agent.scope, "Agent scope changed");
        Ok(agent)
    }

    /// Block or reactivate an agent.
    pub async fn set_status(
        &self,
        organizer: &Organizer,
        agent_id: AgentId,
        status: AgentStatus,
    ) -> TicketResult<Agent> {
        self.owned_agent(organizer, agent_id).await?;
        let agent = self
            .agents
            .update_status(agent_id, status)
            .await?
            .ok_or(TicketError::AgentNotFound(agent_id))?;
        info!(%agent_id, ?status, "Agent status changed");
        Ok(agent)
    }

    /// Replace the access code. The old code stops working immediately.
    pub async fn regenerate_code(
        &self,
        organizer: &Organizer,
        agent_id: AgentId,
    ) -> TicketResult<Agent> {
        self.owned_agent(organizer, agent_id).await?;
        for attempt in 1..=self.max_generation_attempts {
            let code = self.codes.access_code();
            match self.agents.replace_access_code(agent_id, &code).await {
                Ok(Some(agent)) => {
                    info!(%agent_id, "Agent access code regenerated");
                    return Ok(agent);
                }
                Ok(None) => return Err(TicketError::AgentNotFound(agent_id)),
                Err(TicketError::CodeCollision) => {
                    warn!(%agent_id, attempt, "Access code collision, drawing again");
                }
                Err(err) => return Err(err),
            }
        }
        Err(TicketError::CodeSpaceExhausted(self.max_generation_attempts))
    }

    /// Revoke and remove an agent. Audit rows keep its ID.
    pub async fn delete_agent(&self, organizer: &Organizer, agent_id: AgentId) -> TicketResult<()> {
        self.owned_agent(organizer, agent_id).await?;
        if !self.agents.delete_agent(agent_id).await? {
            return Err(TicketError::AgentNotFound(agent_id));
        }
        info!(%agent_id, "Agent deleted");
        Ok(())
    }

    /// One of the organizer's agents, with presence.
    pub async fn get_agent(
        &self,
        organizer: &Organizer,
        agent_id: AgentId,
    ) -> TicketResult<AgentListing> {
        let agent = self.owned_agent(organizer, agent_id).await?;
        self.with_presence(agent, Utc::now()).await
    }

    /// The organizer's agents, oldest first, with presence.
    pub async fn list_agents(&self, organizer: &Organizer) -> TicketResult<Vec<AgentListing>> {
        let now = Utc::now();
        let agents = self.agents.list_agents(organizer.organizer_id).await?;
        let mut listed = Vec::with_capacity(agents.len());
        for agent in agents {
            listed.push(self.with_presence(agent, now).await?);
        }
        debug!(organizer_id = %organizer.organizer_id, count = listed.len(), "Agents listed");
        Ok(listed)
    }

    /// Check that the holder of `access_code` may scan for `event_id`.
    ///
    /// The agent must exist, be active, belong to the event's organizer and
    /// have the event in scope.
    pub async fn authorize(&self, access_code: &str, event_id: EventId) -> TicketResult<AgentRef> {
        let Some(agent) = self.agents.find_by_access_code(access_code).await? else {
            debug!(%event_id, "Unknown access code");
            return Err(TicketError::Unauthorized);
        };
        if agent.status == AgentStatus::Blocked {
            debug!(agent_id = %agent.id, %event_id, "Blocked agent");
            return Err(TicketError::Unauthorized);
        }
        let owns_event = self
            .events
            .get_event(event_id)
            .await?
            .is_some_and(|event| event.organizer_id == agent.organizer_id);
        if !owns_event || !agent.scope.includes(event_id) {
            debug!(agent_id = %agent.id, %event_id, "Event outside agent scope");
            return Err(TicketError::Unauthorized);
        }
        Ok(AgentRef::from(&agent))
    }

    /// Record a heartbeat from the device holding `access_code`.
    ///
    /// Presence is advisory: blocked agents may still report in.
    pub async fn heartbeat(&self, access_code: &str) -> TicketResult<AgentId> {
        let agent = self
            .agents
            .find_by_access_code(access_code)
            .await?
            .ok_or(TicketError::Unauthorized)?;
        self.presence.touch(agent.id, Utc::now()).await?;
        debug!(agent_id = %agent.id, "Heartbeat");
        Ok(agent.id)
    }

    /// Whether a heartbeat at `last_seen` still counts as online at `now`.
    pub fn is_online_at(&self, last_seen: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        last_seen.is_some_and(|seen| now.signed_duration_since(seen) < self.online_window)
    }

    async fn owned_agent(&self, organizer: &Organizer, agent_id: AgentId) -> TicketResult<Agent> {
        match self.agents.get_agent(agent_id).await? {
            Some(agent) if agent.organizer_id == organizer.organizer_id => Ok(agent),
            _ => Err(TicketError::AgentNotFound(agent_id)),
        }
    }

    async fn check_scope(&self, organizer: &Organizer, scope: &AgentScope) -> TicketResult<()> {
        if let AgentScope::Events(event_ids) = scope {
            for event_id in event_ids {
                organizer.owned_event(self.events.as_ref(), *event_id).await?;
            }
        }
        Ok(())
    }

    async fn with_presence(&self, mut agent: Agent, now: DateTime<Utc>) -> TicketResult<AgentListing> {
        let last_seen = self.presence.last_seen(agent.id).await?;
        agent.last_seen_at = last_seen.or(agent.last_seen_at);
        let online = self.is_online_at(agent.last_seen_at, now);
        Ok(AgentListing { agent, online })
    }
}
