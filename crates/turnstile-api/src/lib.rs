//! HTTP and `WebSocket` API for Turnstile.
//!
//! This crate exposes the ticketing core over Axum:
//!
//! - **Sales** -- events, tiers, availability and `reserve-and-book`
//! - **Agent console** -- issue, scope, block, rotate and revoke the
//!   credentials used by scanning devices
//! - **Scanning devices** -- check-in and heartbeat, authenticated by
//!   access code
//! - **Dashboard** -- admission counters, per-code audit trail, reversal
//!   and the live `/ws/checkins` feed
//!
//! # Architecture
//!
//! Handlers hold no state of their own. Each request goes straight to the
//! services in [`AppState`], which own every capacity and admission
//! decision; this layer only extracts principals, validates bodies and maps
//! [`ApiError`] to HTTP statuses.

pub mod agents;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod router;
pub mod scanner;
pub mod server;
pub mod state;
pub mod ws;

pub use error::ApiError;
pub use router::build_router;
pub use server::{ServerError, start_server};
pub use state::AppState;
