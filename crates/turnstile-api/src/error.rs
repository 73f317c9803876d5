//! Error types for the Turnstile API server.
//!
//! [`ApiError`] unifies all failure modes into a single enum that can be
//! converted into an Axum HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation. Every error
//! body has the shape `{"error": <code>, "message": <text>, "status": <n>}`;
//! denied scans add a `reason` and refused sales add `available`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use turnstile_core::TicketError;
use turnstile_types::DenialReason;

/// Errors that can occur in the API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A business or storage error from the ticketing core.
    #[error(transparent)]
    Ticket(#[from] TicketError),

    /// A scan was classified as denied.
    #[error("check-in denied: {0:?}")]
    Denied(DenialReason),

    /// The request body failed validation.
    #[error("validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    /// A required credential header is absent.
    #[error("missing header {0}")]
    MissingHeader(&'static str),

    /// A header is present but malformed.
    #[error("invalid header {name}: {detail}")]
    InvalidHeader {
        /// Header name.
        name: &'static str,
        /// What was wrong with it.
        detail: String,
    },

    /// A UUID could not be parsed from the request path.
    #[error("invalid UUID: {0}")]
    InvalidUuid(String),

    /// The request is well formed but asks for nothing.
    #[error("invalid request: {0}")]
    BadRequest(String),
}

impl ApiError {
    /// HTTP status for this error.
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Ticket(err) => ticket_status(err),
            Self::Denied(_) | Self::MissingHeader(_) => StatusCode::UNAUTHORIZED,
            Self::Validation(_)
            | Self::InvalidHeader { .. }
            | Self::InvalidUuid(_)
            | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Stable machine-readable error code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Ticket(err) => ticket_code(err),
            Self::Denied(DenialReason::Unauthorized) | Self::MissingHeader(_) => "unauthorized",
            Self::Denied(DenialReason::WrongEvent) => "wrong_event",
            Self::Denied(DenialReason::Voided) => "voided",
            Self::Validation(_) => "validation_failed",
            Self::InvalidHeader { .. } => "invalid_header",
            Self::InvalidUuid(_) => "invalid_uuid",
            Self::BadRequest(_) => "bad_request",
        }
    }
}

const fn ticket_status(err: &TicketError) -> StatusCode {
    match err {
        TicketError::InsufficientStock { .. }
        | TicketError::AlreadyCheckedIn(_)
        | TicketError::NotCheckedIn => StatusCode::CONFLICT,
        TicketError::Unauthorized => StatusCode::UNAUTHORIZED,
        TicketError::ReversalDenied => StatusCode::FORBIDDEN,
        TicketError::NotFound
        | TicketError::EventNotFound(_)
        | TicketError::TierNotFound(_)
        | TicketError::BookingNotFound(_)
        | TicketError::AgentNotFound(_) => StatusCode::NOT_FOUND,
        TicketError::InvalidQuantity { .. } | TicketError::InvalidInput(_) => {
            StatusCode::BAD_REQUEST
        }
        TicketError::CodeSpaceExhausted(_) => StatusCode::SERVICE_UNAVAILABLE,
        TicketError::CodeCollision
        | TicketError::CapacityUnderflow { .. }
        | TicketError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

const fn ticket_code(err: &TicketError) -> &'static str {
    match err {
        TicketError::InsufficientStock { .. } => "insufficient_stock",
        TicketError::Unauthorized => "unauthorized",
        TicketError::NotFound => "not_found",
        TicketError::AlreadyCheckedIn(_) => "already_checked_in",
        TicketError::ReversalDenied => "reversal_denied",
        TicketError::NotCheckedIn => "not_checked_in",
        TicketError::InvalidQuantity { .. } => "invalid_quantity",
        TicketError::InvalidInput(_) => "invalid_input",
        TicketError::EventNotFound(_) => "event_not_found",
        TicketError::TierNotFound(_) => "tier_not_found",
        TicketError::BookingNotFound(_) => "booking_not_found",
        TicketError::AgentNotFound(_) => "agent_not_found",
        TicketError::CodeSpaceExhausted(_) => "code_space_exhausted",
        TicketError::CodeCollision | TicketError::CapacityUnderflow { .. } => "internal",
        TicketError::Storage(_) => "storage",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let mut body = serde_json::json!({
            "error": self.code(),
            "message": self.to_string(),
            "status": status.as_u16(),
        });
        match &self {
            Self::Denied(reason) => {
                body["reason"] = serde_json::json!(reason);
            }
            Self::Ticket(TicketError::InsufficientStock { available, .. }) => {
                body["available"] = serde_json::json!(available);
            }
            _ => {}
        }

        (status, axum::Json(body)).into_response()
    }
}
