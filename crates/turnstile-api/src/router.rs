//! Axum router construction for the Turnstile API.
//!
//! Assembles the sales, console and scanner routes plus the check-in feed
//! into a single [`Router`] with CORS and request tracing.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::{agents, handlers, scanner, ws};

/// Build the complete Axum router.
///
/// The router includes:
/// - `GET /health` -- liveness probe
/// - `POST /api/events`, `GET /api/events/{id}` -- events
/// - `POST|GET /api/events/{id}/tiers` -- tiers of an event
/// - `GET /api/events/{id}/stats` -- admission counters
/// - `GET /api/tiers/{id}/availability` -- remaining capacity
/// - `POST /api/reserve-and-book` -- sell units
/// - `GET|DELETE /api/bookings/{id}` -- fetch or cancel a booking
/// - `POST|GET /api/agents`, `GET|PATCH|DELETE /api/agents/{id}`,
///   `POST /api/agents/{id}/regenerate-code` -- agent console
/// - `POST /api/checkin`, `POST /api/heartbeat` -- scanning devices
/// - `POST /api/checkin/reverse` -- undo a check-in
/// - `GET /api/units/{code}/attempts` -- audit trail of a code
/// - `GET /ws/checkins` -- live check-in feed
///
/// CORS allows any origin so scanner apps and the console can be served
/// from other hosts.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        // WebSocket
        .route("/ws/checkins", get(ws::ws_checkins))
        // Events and tiers
        .route("/api/events", post(handlers::create_event))
        .route("/api/events/{id}", get(handlers::get_event))
        .route(
            "/api/events/{id}/tiers",
            post(handlers::create_tier).get(handlers::list_tiers),
        )
        .route("/api/events/{id}/stats", get(scanner::event_stats))
        .route(
            "/api/tiers/{id}/availability",
            get(handlers::tier_availability),
        )
        // Sales
        .route("/api/reserve-and-book", post(handlers::reserve_and_book))
        .route(
            "/api/bookings/{id}",
            get(handlers::get_booking).delete(handlers::cancel_booking),
        )
        // Agent console
        .route(
            "/api/agents",
            post(agents::create_agent).get(agents::list_agents),
        )
        .route(
            "/api/agents/{id}",
            get(agents::get_agent)
                .patch(agents::update_agent)
                .delete(agents::delete_agent),
        )
        .route(
            "/api/agents/{id}/regenerate-code",
            post(agents::regenerate_code),
        )
        // Scanning devices
        .route("/api/checkin", post(scanner::checkin))
        .route("/api/checkin/reverse", post(scanner::reverse_checkin))
        .route("/api/heartbeat", post(scanner::heartbeat))
        .route("/api/units/{code}/attempts", get(scanner::unit_attempts))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
