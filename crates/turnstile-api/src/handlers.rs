//! REST handlers for events, tiers and bookings.
//!
//! All handlers read through [`AppState`] into the core services; nothing
//! is cached at this layer, so availability figures are authoritative at the
//! moment they are served.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use turnstile_core::{NewBooking, NewTier, TicketError};
use turnstile_types::{Booking, BookingId, Buyer, EventId, SalesChannel, TierId, UnitCode};
use validator::Validate;

use crate::error::ApiError;
use crate::extract::{OrganizerAuth, parse_uuid};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request and response bodies
// ---------------------------------------------------------------------------

/// Body of `POST /api/events`.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateEventRequest {
    /// Display name.
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    /// Scheduled start.
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
}

/// Body of `POST /api/events/{id}/tiers`.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateTierRequest {
    /// Display name.
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    /// Unit price.
    pub price: Decimal,
    /// Units that may ever be sold.
    #[validate(range(min = 1))]
    pub capacity: u32,
}

/// Buyer contact in a sale request.
#[derive(Debug, Deserialize, Validate)]
pub struct BuyerRequest {
    /// Full name.
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    /// Email address or phone number.
    #[validate(length(min = 3, max = 320))]
    pub contact: String,
}

/// Body of `POST /api/reserve-and-book`.
#[derive(Debug, Deserialize, Validate)]
pub struct ReserveAndBookRequest {
    /// Event the units admit to.
    pub event_id: EventId,
    /// Tier to sell from.
    pub tier_id: TierId,
    /// Units to sell.
    pub quantity: u32,
    /// Who is buying.
    #[validate(nested)]
    pub buyer: BuyerRequest,
    /// Where the sale happens.
    pub channel: SalesChannel,
}

/// Response of a successful sale.
#[derive(Debug, Serialize)]
pub struct BookingReceipt {
    /// New booking ID.
    pub booking_id: BookingId,
    /// One code per admitted person.
    pub unit_codes: Vec<UnitCode>,
    /// The full booking.
    pub booking: Booking,
}

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

/// Liveness probe.
#[allow(clippy::unused_async)]
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Create an event owned by the calling organizer.
pub async fn create_event(
    State(state): State<Arc<AppState>>,
    OrganizerAuth(organizer): OrganizerAuth,
    Json(body): Json<CreateEventRequest>,
) -> Result<impl IntoResponse, ApiError> {
    body.validate()?;
    let event = state
        .core
        .catalog
        .create_event(&organizer, &body.name, body.starts_at)
        .await?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// Fetch one of the caller's events.
pub async fn get_event(
    State(state): State<Arc<AppState>>,
    OrganizerAuth(organizer): OrganizerAuth,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let event_id = EventId::from(parse_uuid(&id_str)?);
    let event = state.core.catalog.event(&organizer, event_id).await?;
    Ok(Json(event))
}

// ---------------------------------------------------------------------------
// Tiers
// ---------------------------------------------------------------------------

/// Define a tier on one of the caller's events.
pub async fn create_tier(
    State(state): State<Arc<AppState>>,
    OrganizerAuth(organizer): OrganizerAuth,
    Path(id_str): Path<String>,
    Json(body): Json<CreateTierRequest>,
) -> Result<impl IntoResponse, ApiError> {
    body.validate()?;
    let event_id = EventId::from(parse_uuid(&id_str)?);
    let tier = state
        .core
        .catalog
        .define_tier(&organizer, NewTier {
            event_id,
            name: body.name,
            price: body.price,
            capacity: body.capacity,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(tier)))
}

/// List the tiers of an event with their live availability.
pub async fn list_tiers(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let event_id = EventId::from(parse_uuid(&id_str)?);
    let tiers = state.core.catalog.list_tiers(event_id).await?;
    let tiers: Vec<serde_json::Value> = tiers
        .iter()
        .map(|tier| {
            serde_json::json!({
                "id": tier.id,
                "name": tier.name,
                "price": tier.price,
                "total_capacity": tier.total_capacity,
                "available": tier.available(),
            })
        })
        .collect();
    Ok(Json(serde_json::json!({
        "count": tiers.len(),
        "tiers": tiers,
    })))
}

/// Display snapshot of one tier's remaining capacity.
pub async fn tier_availability(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let tier_id = TierId::from(parse_uuid(&id_str)?);
    let availability = state.core.catalog.availability(tier_id).await?;
    Ok(Json(availability))
}

// ---------------------------------------------------------------------------
// Bookings
// ---------------------------------------------------------------------------

/// Reserve capacity and record a booking in one step.
///
/// Returns `201` with the unit codes, or `409 insufficient_stock` with the
/// units still available.
pub async fn reserve_and_book(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ReserveAndBookRequest>,
) -> Result<impl IntoResponse, ApiError> {
    body.validate()?;
    let booking = state
        .core
        .ledger
        .create_booking(NewBooking {
            event_id: body.event_id,
            tier_id: body.tier_id,
            quantity: body.quantity,
            buyer: Buyer {
                name: body.buyer.name,
                contact: body.buyer.contact,
            },
            channel: body.channel,
        })
        .await?;
    let receipt = BookingReceipt {
        booking_id: booking.id,
        unit_codes: booking.unit_codes.clone(),
        booking,
    };
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// Fetch a booking of one of the caller's events.
///
/// Bookings of other organizers' events answer `404 booking_not_found`.
pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    OrganizerAuth(organizer): OrganizerAuth,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let booking_id = BookingId::from(parse_uuid(&id_str)?);
    let booking = state.core.ledger.get_booking(booking_id).await?;
    state
        .core
        .catalog
        .event(&organizer, booking.event_id)
        .await
        .map_err(|_foreign| TicketError::BookingNotFound(booking_id))?;
    Ok(Json(booking))
}

/// Cancel a booking of one of the caller's events.
///
/// Refused with `409 already_checked_in` once any unit has been used.
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    OrganizerAuth(organizer): OrganizerAuth,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let booking_id = BookingId::from(parse_uuid(&id_str)?);
    let booking = state.core.ledger.get_booking(booking_id).await?;
    state.core.catalog.event(&organizer, booking.event_id).await?;
    let cancelled = state.core.ledger.cancel_booking(booking_id).await?;
    Ok(Json(cancelled))
}
