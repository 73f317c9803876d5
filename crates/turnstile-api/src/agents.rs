//! Agent console endpoints.
//!
//! Organizers issue, scope, block and revoke the credentials their scanning
//! devices use. Every route requires organizer headers and only ever sees
//! the caller's own agents; a foreign agent ID answers `404`.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use turnstile_types::{AgentId, AgentScope, AgentStatus};
use validator::Validate;

use crate::error::ApiError;
use crate::extract::{OrganizerAuth, parse_uuid};
use crate::state::AppState;

/// Body of `POST /api/agents`.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateAgentRequest {
    /// Label shown in the console.
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    /// Events the agent may scan for; all of the organizer's when absent.
    #[serde(default)]
    pub scope: Option<AgentScope>,
}

/// Body of `PATCH /api/agents/{id}`.
#[derive(Debug, Deserialize)]
pub struct UpdateAgentRequest {
    /// New status.
    #[serde(default)]
    pub status: Option<AgentStatus>,
    /// New scope.
    #[serde(default)]
    pub scope: Option<AgentScope>,
}

fn agent_id(raw: &str) -> Result<AgentId, ApiError> {
    parse_uuid(raw).map(AgentId::from)
}

/// Issue a new scanning credential.
///
/// The response carries the access code; it is also visible in later
/// listings so the console can show it again.
pub async fn create_agent(
    State(state): State<Arc<AppState>>,
    OrganizerAuth(organizer): OrganizerAuth,
    Json(body): Json<CreateAgentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    body.validate()?;
    let agent = state
        .core
        .access
        .create_agent(&organizer, &body.name, body.scope)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "agent_id": agent.id,
            "access_code": agent.access_code,
            "agent": agent,
        })),
    ))
}

/// List the caller's agents with their online flag.
pub async fn list_agents(
    State(state): State<Arc<AppState>>,
    OrganizerAuth(organizer): OrganizerAuth,
) -> Result<impl IntoResponse, ApiError> {
    let agents = state.core.access.list_agents(&organizer).await?;
    Ok(Json(serde_json::json!({
        "count": agents.len(),
        "agents": agents,
    })))
}

/// Fetch one agent with its online flag.
pub async fn get_agent(
    State(state): State<Arc<AppState>>,
    OrganizerAuth(organizer): OrganizerAuth,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = agent_id(&id_str)?;
    let listing = state.core.access.get_agent(&organizer, id).await?;
    Ok(Json(listing))
}

/// Change an agent's status, scope or both.
///
/// The scope is applied before the status, so a request that narrows the
/// scope and blocks the agent leaves it blocked with the narrower scope.
pub async fn update_agent(
    State(state): State<Arc<AppState>>,
    OrganizerAuth(organizer): OrganizerAuth,
    Path(id_str): Path<String>,
    Json(body): Json<UpdateAgentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = agent_id(&id_str)?;
    let access = &state.core.access;
    let agent = match (body.scope, body.status) {
        (None, None) => {
            return Err(ApiError::BadRequest(
                "expected at least one of status, scope".to_owned(),
            ));
        }
        (Some(scope), None) => access.set_scope(&organizer, id, scope).await?,
        (None, Some(status)) => access.set_status(&organizer, id, status).await?,
        (Some(scope), Some(status)) => {
            access.set_scope(&organizer, id, scope).await?;
            access.set_status(&organizer, id, status).await?
        }
    };
    Ok(Json(agent))
}

/// Rotate an agent's access code.
pub async fn regenerate_code(
    State(state): State<Arc<AppState>>,
    OrganizerAuth(organizer): OrganizerAuth,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = agent_id(&id_str)?;
    let agent = state.core.access.regenerate_code(&organizer, id).await?;
    Ok(Json(serde_json::json!({
        "agent_id": agent.id,
        "code": agent.access_code,
    })))
}

/// Revoke and remove an agent.
pub async fn delete_agent(
    State(state): State<Arc<AppState>>,
    OrganizerAuth(organizer): OrganizerAuth,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = agent_id(&id_str)?;
    state.core.access.delete_agent(&organizer, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
