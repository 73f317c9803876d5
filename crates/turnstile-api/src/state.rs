//! Shared application state for the Turnstile API server.

use tokio::sync::broadcast;
use turnstile_core::{Stores, TicketingCore, TurnstileConfig};
use turnstile_types::CheckinAttempt;

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`](std::sync::Arc) and injected via Axum's `State`
/// extractor. Every handler goes through the core services; the state holds
/// no ticketing data of its own.
#[derive(Clone)]
pub struct AppState {
    /// The ticketing services.
    pub core: TicketingCore,
}

impl AppState {
    /// Wrap already-wired services.
    pub const fn new(core: TicketingCore) -> Self {
        Self { core }
    }

    /// Wire services over the given stores.
    ///
    /// Spawns the audit retry task, so it must run inside a Tokio runtime.
    pub fn from_stores(stores: &Stores, config: &TurnstileConfig) -> Self {
        Self::new(TicketingCore::new(stores, config))
    }

    /// Subscribe to the live check-in feed.
    ///
    /// A subscriber that falls behind receives
    /// [`broadcast::error::RecvError::Lagged`] and skips to the newest
    /// attempt.
    pub fn subscribe(&self) -> broadcast::Receiver<CheckinAttempt> {
        self.core.checkin.subscribe()
    }
}
