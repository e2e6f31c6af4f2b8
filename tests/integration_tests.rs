use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use chrono::{Duration, NaiveDate, Utc};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use tower::ServiceExt;

use concierge::config::{AppConfig, ConversationConfig, HotelConfig};
use concierge::db;
use concierge::handlers;
use concierge::services::ai::{LlmProvider, LlmUnderstanding, Message};
use concierge::services::messaging::MessagingProvider;
use concierge::state::AppState;

// ── Mock Providers ──

struct MockLlm {
    down: Arc<AtomicBool>,
}

#[async_trait]
impl LlmProvider for MockLlm {
    async fn chat(&self, _system_prompt: &str, messages: &[Message]) -> anyhow::Result<String> {
        if self.down.load(Ordering::SeqCst) {
            anyhow::bail!("connection refused");
        }
        let last = messages
            .last()
            .map(|m| m.content.to_lowercase())
            .unwrap_or_default();

        // Deterministic responses keyed on the latest guest message
        if last.contains("parking") {
            Ok(r#"{"intent":"question","topic":"parking","field_updates":[],"confidence":0.9}"#.to_string())
        } else if last.contains("reschedule") {
            Ok(r#"{"intent":"reschedule","field_updates":[],"confidence":0.9}"#.to_string())
        } else if last.contains("my partner") {
            Ok(r#"```json
{"intent":"book","field_updates":[{"field":"adults","value":2},{"field":"room_type","value":"penthouse"}],"confidence":0.85}
```"#
                .to_string())
        } else if last.contains("book") {
            Ok(r#"{"intent":"book","field_updates":[],"confidence":0.9}"#.to_string())
        } else {
            Ok(r#"{"intent":"unknown","field_updates":[],"confidence":0.2}"#.to_string())
        }
    }
}

struct MockMessaging {
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

#[async_trait]
impl MessagingProvider for MockMessaging {
    async fn send_message(&self, to: &str, body: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), body.to_string()));
        Ok(())
    }
}

// ── Helpers ──

fn test_config(app_secret: &str) -> AppConfig {
    AppConfig {
        port: 3000,
        database_url: ":memory:".to_string(),
        admin_token: "test-token".to_string(),
        llm_provider: "mock".to_string(),
        ollama_url: "http://localhost:11434".to_string(),
        ollama_model: "llama3.2".to_string(),
        groq_api_key: String::new(),
        groq_model: String::new(),
        instagram_access_token: String::new(),
        instagram_app_secret: app_secret.to_string(), // empty = skip signature validation
        instagram_verify_token: "verify-me".to_string(),
        instagram_api_version: "18.0".to_string(),
        conversation: ConversationConfig {
            backend_timeout_ms: 1_000,
            backend_max_retries: 0,
            retry_delay_ms: 1,
            ..Default::default()
        },
        hotel: HotelConfig {
            room_inventory: 1,
            ..Default::default()
        },
    }
}

struct Harness {
    state: Arc<AppState>,
    sent: Arc<Mutex<Vec<(String, String)>>>,
    llm_down: Arc<AtomicBool>,
}

fn harness_with_secret(app_secret: &str) -> Harness {
    let conn = db::init_db(":memory:").unwrap();
    let sent = Arc::new(Mutex::new(vec![]));
    let llm_down = Arc::new(AtomicBool::new(false));
    let llm = MockLlm {
        down: Arc::clone(&llm_down),
    };
    let state = Arc::new(AppState::new(
        conn,
        test_config(app_secret),
        Arc::new(LlmUnderstanding::new(Box::new(llm))),
        Box::new(MockMessaging {
            sent: Arc::clone(&sent),
        }),
    ));
    Harness {
        state,
        sent,
        llm_down,
    }
}

fn harness() -> Harness {
    harness_with_secret("")
}

fn test_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route(
            "/webhook",
            get(handlers::webhook::verify).post(handlers::webhook::receive),
        )
        .route("/hotel/info", get(handlers::hotel::hotel_info))
        .route("/api/dev/message", post(handlers::dev::send_message))
        .route("/api/sessions/:id", get(handlers::admin::get_session))
        .route("/api/bookings", get(handlers::admin::get_bookings))
        .route("/api/bookings/:id", get(handlers::admin::get_booking))
        .route(
            "/api/bookings/:id/cancel",
            post(handlers::admin::cancel_booking),
        )
        .with_state(state)
}

/// A future stay, far enough out that it never crosses "today".
fn stay(offset_days: i64, nights: i64) -> (NaiveDate, NaiveDate) {
    let check_in = Utc::now().date_naive() + Duration::days(offset_days);
    (check_in, check_in + Duration::days(nights))
}

async fn body_json(res: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Sends one turn through the dev endpoint and returns the reply object.
async fn say(state: &Arc<AppState>, session_id: &str, message: &str) -> serde_json::Value {
    let res = test_app(state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/dev/message")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    serde_json::json!({ "session_id": session_id, "message": message })
                        .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let json = body_json(res).await;
    assert_eq!(json["success"], true);
    json["reply"].clone()
}

async fn admin_get(state: &Arc<AppState>, uri: &str) -> (StatusCode, serde_json::Value) {
    let res = test_app(state.clone())
        .oneshot(
            Request::builder()
                .uri(uri)
                .header("Authorization", "Bearer test-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = res.status();
    (status, body_json(res).await)
}

/// Runs a full new booking and returns its reference.
async fn book(state: &Arc<AppState>, session_id: &str, check_in: NaiveDate, check_out: NaiveDate) -> String {
    say(state, session_id, "I'd like to book a room").await;
    let reply = say(
        state,
        session_id,
        &format!("2 adults, deluxe room, {check_in} to {check_out}"),
    )
    .await;
    assert_eq!(reply["stage"], "collect_contact");
    let reply = say(state, session_id, "Ada Lovelace, ada@example.com").await;
    assert_eq!(reply["kind"], "summary", "{reply}");
    let reply = say(state, session_id, "yes").await;
    assert_eq!(reply["kind"], "committed");
    reply["booking_id"].as_str().unwrap().to_string()
}

fn sign(secret: &str, body: &str) -> String {
    let mut mac = Hmac::<Sha1>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body.as_bytes());
    let hex: String = mac
        .finalize()
        .into_bytes()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect();
    format!("sha1={hex}")
}

fn instagram_event(sender: &str, mid: &str, text: &str) -> String {
    serde_json::json!({
        "object": "instagram",
        "entry": [{
            "id": "17841400000000000",
            "time": 1700000000,
            "messaging": [{
                "sender": { "id": sender },
                "recipient": { "id": "17841400000000000" },
                "timestamp": 1700000000,
                "message": { "mid": mid, "text": text }
            }]
        }]
    })
    .to_string()
}

fn webhook_post(body: String, signature: Option<String>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("Content-Type", "application/json");
    if let Some(sig) = signature {
        builder = builder.header("X-Hub-Signature", sig);
    }
    builder.body(Body::from(body)).unwrap()
}

// ── Health & Hotel Info ──

#[tokio::test]
async fn test_health() {
    let h = harness();
    let res = test_app(h.state)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_json(res).await["status"], "ok");
}

#[tokio::test]
async fn test_hotel_info() {
    let h = harness();
    let res = test_app(h.state)
        .oneshot(Request::builder().uri("/hotel/info").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let json = body_json(res).await;
    assert_eq!(json["name"], "Powersmy Luxury Hotel");
    assert_eq!(json["rooms"].as_array().unwrap().len(), 4);
    assert_eq!(json["rooms"][1]["room_type"], "deluxe");
    assert!(json["answers"]["parking"].as_str().unwrap().contains("parking"));
}

// ── Webhook ──

#[tokio::test]
async fn test_webhook_verification_handshake() {
    let h = harness();
    let res = test_app(h.state.clone())
        .oneshot(
            Request::builder()
                .uri("/webhook?hub.mode=subscribe&hub.verify_token=verify-me&hub.challenge=12345")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body = axum::body::to_bytes(res.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"12345");

    let res = test_app(h.state)
        .oneshot(
            Request::builder()
                .uri("/webhook?hub.mode=subscribe&hub.verify_token=nope&hub.challenge=12345")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_webhook_rejects_bad_signatures() {
    let h = harness_with_secret("app-secret");
    let body = instagram_event("42", "m.1", "hello");

    let res = test_app(h.state.clone())
        .oneshot(webhook_post(body.clone(), None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = test_app(h.state.clone())
        .oneshot(webhook_post(body.clone(), Some(sign("wrong-secret", &body))))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert!(h.sent.lock().unwrap().is_empty());
    assert!(h.state.engine.snapshot("42").unwrap().is_none());
}

#[tokio::test]
async fn test_webhook_processes_signed_message() {
    let h = harness_with_secret("app-secret");
    let body = instagram_event("42", "m.1", "Is there parking at the hotel?");

    let res = test_app(h.state.clone())
        .oneshot(webhook_post(body.clone(), Some(sign("app-secret", &body))))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let sent = h.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "42");
    assert!(sent[0].1.contains("parking"));
}

#[tokio::test]
async fn test_webhook_duplicate_delivery_is_not_reprocessed() {
    let h = harness();
    let body = instagram_event("42", "m.dup", "I want to book a room");

    for _ in 0..2 {
        let res = test_app(h.state.clone())
            .oneshot(webhook_post(body.clone(), None))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    let sent = h.sent.lock().unwrap();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].1, sent[1].1);

    let session = h.state.engine.snapshot("42").unwrap().unwrap();
    assert_eq!(session.history.len(), 2);
    assert_eq!(session.recent_turns.len(), 1);
}

#[tokio::test]
async fn test_webhook_ignores_echoes_and_malformed_payloads() {
    let h = harness();
    let echo = serde_json::json!({
        "object": "instagram",
        "entry": [{ "messaging": [{
            "sender": { "id": "page" },
            "recipient": { "id": "42" },
            "message": { "mid": "m.echo", "text": "our own reply", "is_echo": true }
        }]}]
    })
    .to_string();
    let res = test_app(h.state.clone())
        .oneshot(webhook_post(echo, None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(h.sent.lock().unwrap().is_empty());

    let res = test_app(h.state.clone())
        .oneshot(webhook_post("not json".to_string(), None))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

// ── Conversation Flows ──

#[tokio::test]
async fn test_full_booking_flow_and_admin_listing() {
    let h = harness();
    let (check_in, check_out) = stay(30, 4);

    let reply = say(&h.state, "guest-1", "I'd like to book a room").await;
    assert_eq!(reply["stage"], "collect_dates");
    assert_eq!(reply["workflow"], "new_booking");

    let reply = say(
        &h.state,
        "guest-1",
        &format!("2 adults, deluxe room, {check_in} to {check_out}"),
    )
    .await;
    assert_eq!(reply["stage"], "collect_contact");

    let reply = say(&h.state, "guest-1", "Ada Lovelace, ada@example.com").await;
    assert_eq!(reply["kind"], "summary");
    assert!(reply["text"].as_str().unwrap().contains("Deluxe Room"));
    assert!(reply["text"].as_str().unwrap().contains("4 nights"));

    let reply = say(&h.state, "guest-1", "yes").await;
    assert_eq!(reply["kind"], "committed");
    assert_eq!(reply["stage"], "committed");
    let booking_id = reply["booking_id"].as_str().unwrap().to_string();
    assert!(booking_id.starts_with("HB-"));

    // A second affirmative re-sends the receipt without another write.
    let again = say(&h.state, "guest-1", "yes").await;
    assert_eq!(again["booking_id"], booking_id.as_str());

    let (status, json) = admin_get(&h.state, "/api/bookings").await;
    assert_eq!(status, StatusCode::OK);
    let bookings = json.as_array().unwrap();
    assert_eq!(bookings.len(), 1);
    assert_eq!(bookings[0]["id"], booking_id.as_str());
    assert_eq!(bookings[0]["guest_email"], "ada@example.com");
    assert_eq!(bookings[0]["nights"], 4);
    assert_eq!(bookings[0]["total_amount"], 720.0);
    assert_eq!(bookings[0]["status"], "confirmed");

    let (status, json) = admin_get(&h.state, &format!("/api/bookings/{booking_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["room_type"], "deluxe");
    assert_eq!(json["check_in"], check_in.to_string());

    let (status, json) = admin_get(&h.state, "/api/sessions/guest-1").await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["workflow"].is_null());
    assert_eq!(json["last_commit"]["booking_id"], booking_id.as_str());
}

#[tokio::test]
async fn test_backend_proposals_are_validated() {
    let h = harness();
    let reply = say(&h.state, "guest-1", "book something for me and my partner").await;
    // adults=2 is accepted, the invented room type is not.
    assert_eq!(reply["kind"], "rejection", "{reply}");
    assert!(reply["text"].as_str().unwrap().contains("Executive Suite"));

    let (_, session) = admin_get(&h.state, "/api/sessions/guest-1").await;
    let draft = &session["workflow"]["draft"];
    assert_eq!(draft["adults"], 2);
    assert!(draft["room_type"].is_null());
}

#[tokio::test]
async fn test_capacity_conflict_and_date_order() {
    let h = harness();
    let (check_in, check_out) = stay(20, 3);

    say(&h.state, "guest-1", "I want to book").await;
    let reply = say(&h.state, "guest-1", &format!("{check_out} to {check_in}")).await;
    assert_eq!(reply["kind"], "rejection");
    assert!(reply["text"].as_str().unwrap().contains("must be after check-in"));

    // The rejected turn kept the (later) arrival, so the fix reads as a correction.
    let reply = say(
        &h.state,
        "guest-1",
        &format!("actually {check_in} to {check_out}, 5 adults"),
    )
    .await;
    assert_eq!(reply["stage"], "collect_room_type", "{reply}");
    let reply = say(&h.state, "guest-1", "standard room").await;
    assert_eq!(reply["kind"], "rejection");
    assert_eq!(reply["stage"], "collect_party");

    let (_, session) = admin_get(&h.state, "/api/sessions/guest-1").await;
    let draft = &session["workflow"]["draft"];
    assert_eq!(draft["room_type"], "standard");
    assert!(draft["adults"].is_null());
    assert_eq!(draft["check_in"], check_in.to_string());
}

#[tokio::test]
async fn test_inventory_exhaustion_sends_guest_back_to_dates() {
    let h = harness();
    let (check_in, check_out) = stay(40, 2);
    book(&h.state, "guest-1", check_in, check_out).await;

    say(&h.state, "guest-2", "I'd like to book a room").await;
    say(
        &h.state,
        "guest-2",
        &format!("2 adults, deluxe room, {check_in} to {check_out}"),
    )
    .await;
    let reply = say(&h.state, "guest-2", "Grace Hopper, grace@example.com").await;
    assert_eq!(reply["kind"], "rejection");
    assert_eq!(reply["stage"], "collect_dates");
}

#[tokio::test]
async fn test_reschedule_flow() {
    let h = harness();
    let (check_in, check_out) = stay(50, 2);
    let booking_id = book(&h.state, "guest-1", check_in, check_out).await;

    let reply = say(&h.state, "guest-1", "I need to reschedule my reservation").await;
    assert_eq!(reply["stage"], "locate");
    assert_eq!(reply["workflow"], "reschedule");

    let reply = say(&h.state, "guest-1", &booking_id.to_lowercase()).await;
    assert_eq!(reply["stage"], "collect_dates", "{reply}");

    let (new_in, new_out) = stay(60, 3);
    let reply = say(&h.state, "guest-1", &format!("{new_in} to {new_out}")).await;
    assert_eq!(reply["kind"], "summary");

    let reply = say(&h.state, "guest-1", "looks good").await;
    assert_eq!(reply["kind"], "committed");
    assert_eq!(reply["booking_id"], booking_id.as_str());

    let (_, json) = admin_get(&h.state, &format!("/api/bookings/{booking_id}")).await;
    assert_eq!(json["check_in"], new_in.to_string());
    assert_eq!(json["version"], 2);
}

#[tokio::test]
async fn test_reschedule_gives_up_after_three_misses() {
    let h = harness();
    say(&h.state, "guest-1", "I need to reschedule my reservation").await;

    for reference in ["HB-00000001", "HB-00000002"] {
        let reply = say(&h.state, "guest-1", reference).await;
        assert_eq!(reply["kind"], "rejection");
        assert_eq!(reply["stage"], "locate");
    }
    let reply = say(&h.state, "guest-1", "HB-00000003").await;
    assert_eq!(reply["kind"], "aborted");
    assert!(reply["text"].as_str().unwrap().contains("could not locate"));

    let (_, session) = admin_get(&h.state, "/api/sessions/guest-1").await;
    assert!(session["workflow"].is_null());
}

#[tokio::test]
async fn test_cancelled_reservation_cannot_be_rescheduled() {
    let h = harness();
    let (check_in, check_out) = stay(70, 2);
    let booking_id = book(&h.state, "guest-1", check_in, check_out).await;

    let res = test_app(h.state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/bookings/{booking_id}/cancel"))
                .header("Authorization", "Bearer test-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let (_, json) = admin_get(&h.state, "/api/bookings?status=cancelled").await;
    assert_eq!(json.as_array().unwrap().len(), 1);

    say(&h.state, "guest-2", "please reschedule my stay").await;
    let reply = say(&h.state, "guest-2", &booking_id).await;
    assert_eq!(reply["kind"], "rejection");
    assert_eq!(reply["stage"], "locate");
}

#[tokio::test]
async fn test_backend_outage_asks_to_retry_and_keeps_state() {
    let h = harness();
    say(&h.state, "guest-1", "I'd like to book a room").await;
    let (_, before) = admin_get(&h.state, "/api/sessions/guest-1").await;

    h.llm_down.store(true, Ordering::SeqCst);
    let (check_in, check_out) = stay(30, 2);
    let reply = say(&h.state, "guest-1", &format!("{check_in} to {check_out}")).await;
    assert_eq!(reply["kind"], "retry_later");
    assert_eq!(reply["stage"], "collect_dates");

    let (_, after) = admin_get(&h.state, "/api/sessions/guest-1").await;
    assert_eq!(before, after);

    // Cancelling needs no backend.
    let reply = say(&h.state, "guest-1", "cancel").await;
    assert_eq!(reply["kind"], "aborted");
}

#[tokio::test]
async fn test_sessions_do_not_share_drafts() {
    let h = harness();
    let (a_in, a_out) = stay(30, 2);
    let (b_in, b_out) = stay(45, 5);

    let a = {
        let state = h.state.clone();
        tokio::spawn(async move {
            say(&state, "guest-a", "book a suite").await;
            say(&state, "guest-a", &format!("{a_in} to {a_out}, 3 adults")).await
        })
    };
    let b = {
        let state = h.state.clone();
        tokio::spawn(async move {
            say(&state, "guest-b", "book a standard room").await;
            say(&state, "guest-b", &format!("{b_in} to {b_out}, just me")).await
        })
    };
    assert_eq!(a.await.unwrap()["stage"], "collect_contact");
    assert_eq!(b.await.unwrap()["stage"], "collect_contact");

    let (_, session_a) = admin_get(&h.state, "/api/sessions/guest-a").await;
    let (_, session_b) = admin_get(&h.state, "/api/sessions/guest-b").await;
    assert_eq!(session_a["workflow"]["draft"]["room_type"], "suite");
    assert_eq!(session_a["workflow"]["draft"]["adults"], 3);
    assert_eq!(session_b["workflow"]["draft"]["room_type"], "standard");
    assert_eq!(session_b["workflow"]["draft"]["adults"], 1);
    assert_eq!(session_b["workflow"]["draft"]["check_in"], b_in.to_string());
}

// ── Admin API ──

#[tokio::test]
async fn test_admin_requires_auth() {
    let h = harness();
    for uri in ["/api/bookings", "/api/sessions/guest-1", "/api/bookings/HB-00000000"] {
        let res = test_app(h.state.clone())
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{uri}");

        let res = test_app(h.state.clone())
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .header("Authorization", "Bearer wrong-token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{uri}");
    }
}

#[tokio::test]
async fn test_admin_not_found() {
    let h = harness();
    let (status, _) = admin_get(&h.state, "/api/sessions/nobody").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = admin_get(&h.state, "/api/bookings/HB-00000000").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let res = test_app(h.state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/bookings/HB-00000000/cancel")
                .header("Authorization", "Bearer test-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_dev_message_requires_session_id() {
    let h = harness();
    let res = test_app(h.state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/dev/message")
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"session_id":"  ","message":"hi"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}
