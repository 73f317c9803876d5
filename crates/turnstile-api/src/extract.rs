//! Request principals carried in headers.
//!
//! | Header | Used by | Meaning |
//! |--------|---------|---------|
//! | `x-organizer-id` | console | Organizer account UUID |
//! | `x-organizer-role` | console | `owner`, `manager` or `staff` |
//! | `x-access-code` | device | Agent access code |
//! | `x-event-id` | device | Event selected on the device |
//!
//! Identity is asserted by the gateway in front of this service; these
//! extractors only parse it.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use turnstile_core::Organizer;
use turnstile_types::{EventId, OrganizerId, OrganizerRole};
use uuid::Uuid;

use crate::error::ApiError;

/// Organizer account header.
pub const ORGANIZER_ID_HEADER: &str = "x-organizer-id";
/// Organizer role header.
pub const ORGANIZER_ROLE_HEADER: &str = "x-organizer-role";
/// Device access code header.
pub const ACCESS_CODE_HEADER: &str = "x-access-code";
/// Device selected-event header.
pub const EVENT_ID_HEADER: &str = "x-event-id";

fn header<'a>(parts: &'a Parts, name: &'static str) -> Result<&'a str, ApiError> {
    let value = parts
        .headers
        .get(name)
        .ok_or(ApiError::MissingHeader(name))?;
    let value = value.to_str().map_err(|e| ApiError::InvalidHeader {
        name,
        detail: e.to_string(),
    })?;
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::MissingHeader(name));
    }
    Ok(value)
}

fn uuid_header(parts: &Parts, name: &'static str) -> Result<Uuid, ApiError> {
    let raw = header(parts, name)?;
    Uuid::parse_str(raw).map_err(|e| ApiError::InvalidHeader {
        name,
        detail: e.to_string(),
    })
}

fn parse_role(raw: &str) -> Result<OrganizerRole, ApiError> {
    match raw.to_ascii_lowercase().as_str() {
        "owner" => Ok(OrganizerRole::Owner),
        "manager" => Ok(OrganizerRole::Manager),
        "staff" => Ok(OrganizerRole::Staff),
        other => Err(ApiError::InvalidHeader {
            name: ORGANIZER_ROLE_HEADER,
            detail: format!("unknown role '{other}'"),
        }),
    }
}

/// The organizer behind a console request.
#[derive(Debug, Clone, Copy)]
pub struct OrganizerAuth(pub Organizer);

impl<S: Send + Sync> FromRequestParts<S> for OrganizerAuth {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let organizer_id = OrganizerId::from(uuid_header(parts, ORGANIZER_ID_HEADER)?);
        let role = parse_role(header(parts, ORGANIZER_ROLE_HEADER)?)?;
        Ok(Self(Organizer::new(organizer_id, role)))
    }
}

/// The access code of the device making a request.
#[derive(Debug, Clone)]
pub struct DeviceAuth(pub String);

impl<S: Send + Sync> FromRequestParts<S> for DeviceAuth {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(header(parts, ACCESS_CODE_HEADER)?.to_owned()))
    }
}

/// A scanning device's credential and its selected event.
#[derive(Debug, Clone)]
pub struct ScanContext {
    /// Agent access code.
    pub access_code: String,
    /// Event the device is scanning for.
    pub event_id: EventId,
}

impl<S: Send + Sync> FromRequestParts<S> for ScanContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let access_code = header(parts, ACCESS_CODE_HEADER)?.to_owned();
        let event_id = EventId::from(uuid_header(parts, EVENT_ID_HEADER)?);
        Ok(Self {
            access_code,
            event_id,
        })
    }
}

/// Parse a path segment as a UUID.
pub fn parse_uuid(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|e| ApiError::InvalidUuid(format!("'{raw}': {e}")))
}
