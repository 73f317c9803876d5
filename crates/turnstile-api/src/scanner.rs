//! Scanning device and check-in endpoints.
//!
//! Devices authenticate with `x-access-code` and name their selected event
//! in `x-event-id`. A scan answers `200` with `status` `success` or
//! `already`; an unknown code answers `404` and a refused scan answers `401`
//! with a `reason`. Reversal, stats and the audit trail are console routes.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use turnstile_core::{CheckinResult, ScannedUnit, TicketError};
use turnstile_types::EventId;
use validator::Validate;

use crate::error::ApiError;
use crate::extract::{DeviceAuth, OrganizerAuth, ScanContext, parse_uuid};
use crate::state::AppState;

/// Body of `POST /api/checkin` and `POST /api/checkin/reverse`.
#[derive(Debug, Deserialize, Validate)]
pub struct ScanRequest {
    /// The code as scanned or typed.
    #[validate(length(min = 1, max = 256))]
    pub code: String,
}

fn scan_body(status: &str, scanned: &ScannedUnit) -> serde_json::Value {
    serde_json::json!({
        "status": status,
        "unit": scanned.unit,
        "booking": scanned.booking,
    })
}

/// Validate a scanned code and record first use.
pub async fn checkin(
    State(state): State<Arc<AppState>>,
    scan: ScanContext,
    Json(body): Json<ScanRequest>,
) -> Result<impl IntoResponse, ApiError> {
    body.validate()?;
    let result = state
        .core
        .checkin
        .checkin(&body.code, &scan.access_code, scan.event_id)
        .await?;
    match result {
        CheckinResult::Admitted(scanned) => Ok(Json(scan_body("success", &scanned))),
        CheckinResult::AlreadyCheckedIn(scanned) => Ok(Json(scan_body("already", &scanned))),
        CheckinResult::Denied(reason) => Err(ApiError::Denied(reason)),
        CheckinResult::NotFound => Err(ApiError::Ticket(TicketError::NotFound)),
    }
}

/// Record that a device is alive.
pub async fn heartbeat(
    State(state): State<Arc<AppState>>,
    DeviceAuth(access_code): DeviceAuth,
) -> Result<impl IntoResponse, ApiError> {
    state.core.access.heartbeat(&access_code).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Undo a check-in so the code admits again.
pub async fn reverse_checkin(
    State(state): State<Arc<AppState>>,
    OrganizerAuth(organizer): OrganizerAuth,
    Json(body): Json<ScanRequest>,
) -> Result<impl IntoResponse, ApiError> {
    body.validate()?;
    let scanned = state.core.checkin.reverse(&organizer, &body.code).await?;
    Ok(Json(scan_body("reversed", &scanned)))
}

/// Admission counters for one of the caller's events.
pub async fn event_stats(
    State(state): State<Arc<AppState>>,
    OrganizerAuth(organizer): OrganizerAuth,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let event_id = EventId::from(parse_uuid(&id_str)?);
    let stats = state.core.checkin.stats(&organizer, event_id).await?;
    Ok(Json(stats))
}

/// Audit trail of one unit code, oldest first.
pub async fn unit_attempts(
    State(state): State<Arc<AppState>>,
    OrganizerAuth(organizer): OrganizerAuth,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let attempts = state
        .core
        .checkin
        .attempts_for_code(&organizer, &code)
        .await?;
    Ok(Json(serde_json::json!({
        "count": attempts.len(),
        "attempts": attempts,
    })))
}
