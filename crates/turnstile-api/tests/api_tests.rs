//! Integration tests for the Turnstile API endpoints.
//!
//! Tests use Axum's `Router` directly via `tower::ServiceExt` without
//! starting a TCP server, over the in-memory backend.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;
use turnstile_api::router::build_router;
use turnstile_api::state::AppState;
use turnstile_core::{Stores, TurnstileConfig};
use uuid::Uuid;

// =============================================================================
// Helpers
// =============================================================================

struct Console {
    organizer_id: String,
    role: &'static str,
}

impl Console {
    fn new(role: &'static str) -> Self {
        Self {
            organizer_id: Uuid::now_v7().to_string(),
            role,
        }
    }

    fn with_role(&self, role: &'static str) -> Self {
        Self {
            organizer_id: self.organizer_id.clone(),
            role,
        }
    }

    fn request(&self, method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-organizer-id", self.organizer_id.as_str())
            .header("x-organizer-role", self.role);
        with_body(builder, body)
    }
}

fn with_body(builder: axum::http::request::Builder, body: Option<Value>) -> Request<Body> {
    match body {
        Some(value) => builder
            .header("content-type", "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn device_request(access_code: &str, event_id: &str, code: &str) -> Request<Body> {
    let builder = Request::builder()
        .method("POST")
        .uri("/api/checkin")
        .header("x-access-code", access_code)
        .header("x-event-id", event_id);
    with_body(builder, Some(json!({ "code": code })))
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    (status, body_to_json(response.into_body()).await)
}

fn app() -> Router {
    let state = AppState::from_stores(&Stores::in_memory(), &TurnstileConfig::default());
    build_router(Arc::new(state))
}

/// An event with one tier of the given capacity.
async fn event_with_tier(app: &Router, console: &Console, capacity: u32) -> (String, String) {
    let (status, event) = send(
        app,
        console.request("POST", "/api/events", Some(json!({ "name": "Harbour Lights" }))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let event_id = event["id"].as_str().unwrap().to_owned();

    let (status, tier) = send(
        app,
        console.request(
            "POST",
            &format!("/api/events/{event_id}/tiers"),
            Some(json!({ "name": "Standing", "price": "35.00", "capacity": capacity })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    (event_id, tier["id"].as_str().unwrap().to_owned())
}

fn sale(event_id: &str, tier_id: &str, quantity: u32) -> Value {
    json!({
        "event_id": event_id,
        "tier_id": tier_id,
        "quantity": quantity,
        "buyer": { "name": "Ana Ruiz", "contact": "ana@example.com" },
        "channel": "online",
    })
}

async fn book(app: &Router, event_id: &str, tier_id: &str, quantity: u32) -> Value {
    let request = with_body(
        Request::builder().method("POST").uri("/api/reserve-and-book"),
        Some(sale(event_id, tier_id, quantity)),
    );
    let (status, receipt) = send(app, request).await;
    assert_eq!(status, StatusCode::CREATED);
    receipt
}

async fn agent_code(app: &Router, console: &Console, name: &str) -> (String, String) {
    let (status, body) = send(
        app,
        console.request("POST", "/api/agents", Some(json!({ "name": name }))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    (
        body["agent_id"].as_str().unwrap().to_owned(),
        body["access_code"].as_str().unwrap().to_owned(),
    )
}

// =============================================================================
// Sales
// =============================================================================

#[tokio::test]
async fn health_returns_ok() {
    let app = app();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn sale_issues_one_code_per_unit() {
    let app = app();
    let console = Console::new("owner");
    let (event_id, tier_id) = event_with_tier(&app, &console, 5).await;

    let receipt = book(&app, &event_id, &tier_id, 3).await;
    assert_eq!(receipt["unit_codes"].as_array().unwrap().len(), 3);
    assert_eq!(receipt["booking"]["quantity"], 3);

    let request = Request::builder()
        .uri(format!("/api/tiers/{tier_id}/availability"))
        .body(Body::empty())
        .unwrap();
    let (status, availability) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(availability["available"], 2);
    assert_eq!(availability["total"], 5);

    let request = Request::builder()
        .uri(format!("/api/events/{event_id}/tiers"))
        .body(Body::empty())
        .unwrap();
    let (_, listing) = send(&app, request).await;
    assert_eq!(listing["count"], 1);
    assert_eq!(listing["tiers"][0]["available"], 2);
}

#[tokio::test]
async fn oversell_is_refused_with_remaining_stock() {
    let app = app();
    let console = Console::new("owner");
    let (event_id, tier_id) = event_with_tier(&app, &console, 2).await;
    book(&app, &event_id, &tier_id, 1).await;

    let request = with_body(
        Request::builder().method("POST").uri("/api/reserve-and-book"),
        Some(sale(&event_id, &tier_id, 2)),
    );
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "insufficient_stock");
    assert_eq!(body["available"], 1);
}

#[tokio::test]
async fn invalid_buyer_is_rejected() {
    let app = app();
    let console = Console::new("owner");
    let (event_id, tier_id) = event_with_tier(&app, &console, 2).await;

    let mut body = sale(&event_id, &tier_id, 1);
    body["buyer"]["name"] = json!("");
    let request = with_body(
        Request::builder().method("POST").uri("/api/reserve-and-book"),
        Some(body),
    );
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_failed");
}

#[tokio::test]
async fn invalid_path_uuid_is_bad_request() {
    let app = app();
    let console = Console::new("owner");
    let (status, body) = send(&app, console.request("GET", "/api/bookings/not-a-uuid", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_uuid");
}

#[tokio::test]
async fn foreign_event_is_not_found() {
    let app = app();
    let console = Console::new("owner");
    let (event_id, _) = event_with_tier(&app, &console, 1).await;

    let stranger = Console::new("owner");
    let (status, _) = send(
        &app,
        stranger.request("GET", &format!("/api/events/{event_id}"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn booking_reads_require_the_owning_organizer() {
    let app = app();
    let console = Console::new("owner");
    let (event_id, tier_id) = event_with_tier(&app, &console, 2).await;
    let receipt = book(&app, &event_id, &tier_id, 1).await;
    let booking_id = receipt["booking_id"].as_str().unwrap();
    let uri = format!("/api/bookings/{booking_id}");

    let anonymous = Request::builder().uri(&uri).body(Body::empty()).unwrap();
    let (status, body) = send(&app, anonymous).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.get("booking").is_none());

    let stranger = Console::new("owner");
    let (status, body) = send(&app, stranger.request("GET", &uri, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "booking_not_found");

    let (status, body) = send(&app, console.request("GET", &uri, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["buyer"]["name"], "Ana Ruiz");
}

#[tokio::test]
async fn cancel_restores_capacity() {
    let app = app();
    let console = Console::new("owner");
    let (event_id, tier_id) = event_with_tier(&app, &console, 2).await;
    let receipt = book(&app, &event_id, &tier_id, 2).await;
    let booking_id = receipt["booking_id"].as_str().unwrap();

    let (status, cancelled) = send(
        &app,
        console.request("DELETE", &format!("/api/bookings/{booking_id}"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(cancelled["cancelled_at"].is_string());

    let request = Request::builder()
        .uri(format!("/api/tiers/{tier_id}/availability"))
        .body(Body::empty())
        .unwrap();
    let (_, availability) = send(&app, request).await;
    assert_eq!(availability["available"], 2);
}

// =============================================================================
// Scanning
// =============================================================================

#[tokio::test]
async fn second_scan_reports_already() {
    let app = app();
    let console = Console::new("owner");
    let (event_id, tier_id) = event_with_tier(&app, &console, 2).await;
    let receipt = book(&app, &event_id, &tier_id, 1).await;
    let code = receipt["unit_codes"][0].as_str().unwrap().to_owned();
    let (agent_id, access_code) = agent_code(&app, &console, "Gate A").await;

    let (status, first) = send(&app, device_request(&access_code, &event_id, &code)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["status"], "success");
    assert_eq!(first["unit"]["checked_in_by"], agent_id.as_str());

    let (status, second) = send(&app, device_request(&access_code, &event_id, &code)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["status"], "already");
    assert_eq!(second["unit"]["checked_in_at"], first["unit"]["checked_in_at"]);

    let (status, stats) = send(
        &app,
        console.request("GET", &format!("/api/events/{event_id}/stats"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_units"], 1);
    assert_eq!(stats["checked_in"], 1);

    let (status, trail) = send(
        &app,
        console.request("GET", &format!("/api/units/{code}/attempts"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(trail["count"], 2);
    assert_eq!(trail["attempts"][0]["outcome"], "success");
    assert_eq!(trail["attempts"][1]["outcome"], "already");
}

#[tokio::test]
async fn unknown_code_is_not_found() {
    let app = app();
    let console = Console::new("owner");
    let (event_id, _) = event_with_tier(&app, &console, 1).await;
    let (_, access_code) = agent_code(&app, &console, "Gate B").await;

    let (status, body) = send(&app, device_request(&access_code, &event_id, "0000000000")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn unknown_access_code_is_denied() {
    let app = app();
    let console = Console::new("owner");
    let (event_id, tier_id) = event_with_tier(&app, &console, 1).await;
    let receipt = book(&app, &event_id, &tier_id, 1).await;
    let code = receipt["unit_codes"][0].as_str().unwrap().to_owned();

    let (status, body) = send(&app, device_request("NOPE2345", &event_id, &code)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["reason"], "unauthorized");
}

#[tokio::test]
async fn scan_without_credentials_is_unauthorized() {
    let app = app();
    let request = with_body(
        Request::builder().method("POST").uri("/api/checkin"),
        Some(json!({ "code": "ABCD2345" })),
    );
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn cancelled_code_is_voided() {
    let app = app();
    let console = Console::new("owner");
    let (event_id, tier_id) = event_with_tier(&app, &console, 1).await;
    let receipt = book(&app, &event_id, &tier_id, 1).await;
    let code = receipt["unit_codes"][0].as_str().unwrap().to_owned();
    let booking_id = receipt["booking_id"].as_str().unwrap();
    let (_, access_code) = agent_code(&app, &console, "Gate C").await;

    let (status, _) = send(
        &app,
        console.request("DELETE", &format!("/api/bookings/{booking_id}"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, device_request(&access_code, &event_id, &code)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["reason"], "voided");
}

#[tokio::test]
async fn checked_in_booking_cannot_be_cancelled() {
    let app = app();
    let console = Console::new("owner");
    let (event_id, tier_id) = event_with_tier(&app, &console, 2).await;
    let receipt = book(&app, &event_id, &tier_id, 2).await;
    let code = receipt["unit_codes"][0].as_str().unwrap().to_owned();
    let booking_id = receipt["booking_id"].as_str().unwrap();
    let (_, access_code) = agent_code(&app, &console, "Gate D").await;
    send(&app, device_request(&access_code, &event_id, &code)).await;

    let (status, body) = send(
        &app,
        console.request("DELETE", &format!("/api/bookings/{booking_id}"), None),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "already_checked_in");
}

#[tokio::test]
async fn reversal_requires_elevated_role() {
    let app = app();
    let console = Console::new("owner");
    let (event_id, tier_id) = event_with_tier(&app, &console, 1).await;
    let receipt = book(&app, &event_id, &tier_id, 1).await;
    let code = receipt["unit_codes"][0].as_str().unwrap().to_owned();
    let (_, access_code) = agent_code(&app, &console, "Gate E").await;
    send(&app, device_request(&access_code, &event_id, &code)).await;

    let staff = console.with_role("staff");
    let (status, body) = send(
        &app,
        staff.request("POST", "/api/checkin/reverse", Some(json!({ "code": code }))),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "reversal_denied");

    let manager = console.with_role("manager");
    let (status, body) = send(
        &app,
        manager.request("POST", "/api/checkin/reverse", Some(json!({ "code": code }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["unit"]["checked_in_at"].is_null());

    let (status, again) = send(&app, device_request(&access_code, &event_id, &code)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["status"], "success");
}

// =============================================================================
// Agent console
// =============================================================================

#[tokio::test]
async fn agent_lifecycle() {
    let app = app();
    let console = Console::new("owner");
    let (event_id, tier_id) = event_with_tier(&app, &console, 1).await;
    let receipt = book(&app, &event_id, &tier_id, 1).await;
    let code = receipt["unit_codes"][0].as_str().unwrap().to_owned();
    let (agent_id, access_code) = agent_code(&app, &console, "Mobile 3").await;

    let (status, listing) = send(&app, console.request("GET", "/api/agents", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["count"], 1);
    assert_eq!(listing["agents"][0]["online"], false);

    let heartbeat = Request::builder()
        .method("POST")
        .uri("/api/heartbeat")
        .header("x-access-code", access_code.as_str())
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, heartbeat).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, agent) = send(
        &app,
        console.request("GET", &format!("/api/agents/{agent_id}"), None),
    )
    .await;
    assert_eq!(agent["online"], true);

    let (status, _) = send(
        &app,
        console.request("PATCH", &format!("/api/agents/{agent_id}"), Some(json!({}))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, blocked) = send(
        &app,
        console.request(
            "PATCH",
            &format!("/api/agents/{agent_id}"),
            Some(json!({ "status": "blocked" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(blocked["status"], "blocked");
    let (status, body) = send(&app, device_request(&access_code, &event_id, &code)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["reason"], "unauthorized");

    send(
        &app,
        console.request(
            "PATCH",
            &format!("/api/agents/{agent_id}"),
            Some(json!({ "status": "active" })),
        ),
    )
    .await;
    let (status, rotated) = send(
        &app,
        console.request("POST", &format!("/api/agents/{agent_id}/regenerate-code"), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let new_code = rotated["code"].as_str().unwrap().to_owned();
    assert_ne!(new_code, access_code);
    let (status, _) = send(&app, device_request(&access_code, &event_id, &code)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(&app, device_request(&new_code, &event_id, &code)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        console.request("DELETE", &format!("/api/agents/{agent_id}"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(
        &app,
        console.request("GET", &format!("/api/agents/{agent_id}"), None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn scoped_agent_is_denied_elsewhere() {
    let app = app();
    let console = Console::new("owner");
    let (first_event, _) = event_with_tier(&app, &console, 1).await;
    let (second_event, second_tier) = event_with_tier(&app, &console, 1).await;
    let receipt = book(&app, &second_event, &second_tier, 1).await;
    let code = receipt["unit_codes"][0].as_str().unwrap().to_owned();

    let (status, body) = send(
        &app,
        console.request(
            "POST",
            "/api/agents",
            Some(json!({
                "name": "North Door",
                "scope": { "kind": "events", "event_ids": [first_event] },
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let access_code = body["access_code"].as_str().unwrap();

    let (status, body) = send(&app, device_request(access_code, &second_event, &code)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["reason"], "unauthorized");

    let (status, body) = send(&app, device_request(access_code, &first_event, &code)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["reason"], "wrong_event");
}
