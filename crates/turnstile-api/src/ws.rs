//! `WebSocket` feed of live check-in attempts.
//!
//! Console clients connect to `GET /ws/checkins?event_id=<uuid>` with
//! organizer headers and receive each classified scan or reversal for that
//! event as a JSON [`CheckinAttempt`]. The event must belong to the caller.
//!
//! A client that falls behind skips the lagged attempts and resumes from
//! the newest one; the audit trail remains the complete record.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};
use turnstile_types::{CheckinAttempt, EventId};

use crate::error::ApiError;
use crate::extract::OrganizerAuth;
use crate::state::AppState;

/// Query string of `GET /ws/checkins`.
#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    /// Event to follow.
    pub event_id: EventId,
}

/// Upgrade to a `WebSocket` streaming the event's check-in attempts.
///
/// # Route
///
/// `GET /ws/checkins?event_id=<uuid>`
pub async fn ws_checkins(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    OrganizerAuth(organizer): OrganizerAuth,
    Query(query): Query<FeedQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let event = state.core.catalog.event(&organizer, query.event_id).await?;
    let event_id = event.id;
    Ok(ws.on_upgrade(move |socket| handle_ws(socket, state, event_id)))
}

/// Forward the event's attempts as text frames until either side goes away.
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>, event_id: EventId) {
    debug!(%event_id, "Check-in feed client connected");

    let mut rx = state.subscribe();

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(attempt) => {
                        if !belongs_to(&attempt, event_id) {
                            continue;
                        }
                        let json = match serde_json::to_string(&attempt) {
                            Ok(j) => j,
                            Err(e) => {
                                warn!("Failed to serialize check-in attempt: {e}");
                                continue;
                            }
                        };
                        if socket.send(Message::Text(json.into())).await.is_err() {
                            debug!(%event_id, "Check-in feed client disconnected (send failed)");
                            return;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        debug!(%event_id, skipped = n, "Check-in feed client lagged, skipping ahead");
                    }
                    Err(RecvError::Closed) => {
                        debug!("Check-in feed closed, shutting down WebSocket");
                        return;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(%event_id, "Check-in feed client disconnected");
                        return;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            debug!(%event_id, "Check-in feed client disconnected (pong failed)");
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {e}");
                        return;
                    }
                    _ => {}
                }
            }
        }
    }
}

fn belongs_to(attempt: &CheckinAttempt, event_id: EventId) -> bool {
    attempt.event_id == event_id
}
