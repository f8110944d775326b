//! Integration tests for API routes.
//!
//! Uses `tower::ServiceExt` to drive the Axum router without a real HTTP
//! server, backed by the in-memory stores and a fake push transport.
//!
//! ```bash
//! cargo test -p pushfleet-api --test integration
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;
use uuid::Uuid;

use pushfleet_common::config::AppConfig;
use pushfleet_common::types::{NotificationPayload, Role, Subscription};
use pushfleet_engine::memory::{InMemoryCampaignRecorder, InMemorySubscriptionRegistry};
use pushfleet_engine::transport::{DeliveryError, PushTransport};

use pushfleet_api::middleware::auth::encode_jwt;
use pushfleet_api::routes::create_router;
use pushfleet_api::state::AppState;

// ============================================================
// Helpers
// ============================================================

const TEST_PUBLIC_KEY: &str =
    "BCRweRf_U5iQM4pKNucGRzM6OuLp8Hisa8yX0N2ePIf1oxKitvFT6qvuGgYoTxlMatMDaytXbZR3rVClc2w_p6U";

/// Transport that reports every endpoint in `gone` as permanently gone.
#[derive(Default)]
struct FakeTransport {
    gone: HashSet<String>,
}

#[async_trait]
impl PushTransport for FakeTransport {
    async fn deliver(
        &self,
        subscription: &Subscription,
        _payload: &NotificationPayload,
    ) -> Result<(), DeliveryError> {
        if self.gone.contains(&subscription.endpoint) {
            Err(DeliveryError::Gone("410 Gone".to_string()))
        } else {
            Ok(())
        }
    }
}

/// Create a test AppConfig with a specific JWT secret.
fn test_config() -> AppConfig {
    AppConfig {
        database_url: None,
        db_max_connections: 5,
        jwt_secret: "test-jwt-secret-for-integration-tests".to_string(),
        jwt_expiry_hours: 24,
        vapid_public_key: Some(TEST_PUBLIC_KEY.to_string()),
        vapid_private_key: None,
        vapid_subject: Some("mailto:ops@pushfleet.dev".to_string()),
        push_max_concurrency: 4,
        push_delivery_timeout_secs: 5,
        push_ttl_seconds: 60,
        api_port: 3000,
    }
}

fn build_state(transport: Option<FakeTransport>) -> AppState {
    let config = test_config();
    let public_key = transport.as_ref().map(|_| TEST_PUBLIC_KEY.to_string());
    AppState::new(
        Arc::new(InMemorySubscriptionRegistry::new()),
        Arc::new(InMemoryCampaignRecorder::new()),
        transport.map(|t| Arc::new(t) as Arc<dyn PushTransport>),
        public_key,
        config,
    )
}

fn token_for(role: Role, username: &str) -> (Uuid, String) {
    let user_id = Uuid::new_v4();
    let config = test_config();
    let token = encode_jwt(
        user_id,
        username,
        role,
        &config.jwt_secret,
        config.jwt_expiry_hours,
    )
    .unwrap();
    (user_id, token)
}

async fn call(
    app: Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}

async fn subscribe(state: &AppState, token: &str, endpoint: &str) {
    let (status, _) = call(
        create_router(state.clone()),
        "POST",
        "/api/push/subscribe",
        Some(token),
        Some(serde_json::json!({
            "endpoint": endpoint,
            "keys": { "p256dh": "client-public-key", "auth": "client-auth" },
            "userAgent": "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) Mobile"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

// ============================================================
// Routes
// ============================================================

#[tokio::test]
async fn test_health_endpoint() {
    let (status, json) = call(
        create_router(build_state(None)),
        "GET",
        "/health",
        None,
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["service"], "pushfleet-api");
}

#[tokio::test]
async fn test_vapid_public_key() {
    let (status, json) = call(
        create_router(build_state(Some(FakeTransport::default()))),
        "GET",
        "/api/push/vapid-public-key",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["publicKey"], TEST_PUBLIC_KEY);

    let (status, _) = call(
        create_router(build_state(None)),
        "GET",
        "/api/push/vapid-public-key",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_subscribe_requires_auth_and_keys() {
    let state = build_state(Some(FakeTransport::default()));

    let (status, _) = call(
        create_router(state.clone()),
        "POST",
        "/api/push/subscribe",
        None,
        Some(serde_json::json!({
            "endpoint": "https://push.example/x",
            "keys": { "p256dh": "k", "auth": "a" }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, token) = token_for(Role::User, "dana");
    let (status, json) = call(
        create_router(state),
        "POST",
        "/api/push/subscribe",
        Some(&token),
        Some(serde_json::json!({
            "endpoint": "https://push.example/x",
            "keys": { "p256dh": "", "auth": "a" }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("p256dh"));
}

#[tokio::test]
async fn test_subscribe_infers_device_type() {
    let state = build_state(Some(FakeTransport::default()));
    let (user_id, token) = token_for(Role::Manager, "erin");

    let (status, json) = call(
        create_router(state),
        "POST",
        "/api/push/subscribe",
        Some(&token),
        Some(serde_json::json!({
            "endpoint": "https://push.example/erin",
            "keys": { "p256dh": "client-public-key", "auth": "client-auth" },
            "userAgent": "Mozilla/5.0 (Linux; Android 14) Mobile Safari"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["deviceType"], "mobile");
    assert_eq!(json["role"], "manager");
    assert_eq!(json["userId"], user_id.to_string());
    assert_eq!(json["isActive"], true);
}

#[tokio::test]
async fn test_send_requires_admin() {
    let state = build_state(Some(FakeTransport::default()));
    let (_, token) = token_for(Role::Manager, "erin");

    let (status, _) = call(
        create_router(state),
        "POST",
        "/api/push/send",
        Some(&token),
        Some(serde_json::json!({ "title": "Hi", "body": "There" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_send_without_push_configured() {
    let state = build_state(None);
    let (_, token) = token_for(Role::Admin, "root");

    let (status, json) = call(
        create_router(state),
        "POST",
        "/api/push/send",
        Some(&token),
        Some(serde_json::json!({ "title": "Hi", "body": "There" })),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error"], "Push notifications are not configured.");
}

#[tokio::test]
async fn test_send_missing_title_is_bad_request() {
    let state = build_state(Some(FakeTransport::default()));
    let (_, token) = token_for(Role::Admin, "root");

    let (status, json) = call(
        create_router(state),
        "POST",
        "/api/push/send",
        Some(&token),
        Some(serde_json::json!({ "body": "There" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "title is required");
}

#[tokio::test]
async fn test_send_with_no_subscribers() {
    let state = build_state(Some(FakeTransport::default()));
    let (_, token) = token_for(Role::Admin, "root");

    let (status, json) = call(
        create_router(state),
        "POST",
        "/api/push/send",
        Some(&token),
        Some(serde_json::json!({ "title": "Hi", "body": "There" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], false);
    assert_eq!(json["sent"], 0);
    assert_eq!(json["failed"], 0);
    assert_eq!(json["errors"][0], "No active subscriptions found");
    assert!(json.get("campaignId").is_none());
}

#[tokio::test]
async fn test_send_prunes_gone_endpoint_and_records_history() {
    let mut gone = HashSet::new();
    gone.insert("https://push.example/stale".to_string());
    let state = build_state(Some(FakeTransport { gone }));

    let (_, alice) = token_for(Role::User, "alice");
    let (_, bob) = token_for(Role::User, "bob");
    subscribe(&state, &alice, "https://push.example/alice").await;
    subscribe(&state, &bob, "https://push.example/stale").await;

    let (_, admin) = token_for(Role::Admin, "root");
    let (status, json) = call(
        create_router(state.clone()),
        "POST",
        "/api/push/send",
        Some(&admin),
        Some(serde_json::json!({
            "title": "Release",
            "body": "Version 2 is out",
            "url": "/changelog"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["sent"], 1);
    assert_eq!(json["failed"], 1);
    let error = json["errors"][0].as_str().unwrap();
    assert!(error.contains("bob"));
    assert!(error.contains("subscription removed"));
    let campaign_id = json["campaignId"].as_str().unwrap().to_string();

    // Stale endpoint is gone for the next campaign
    let (_, json) = call(
        create_router(state.clone()),
        "POST",
        "/api/push/send",
        Some(&admin),
        Some(serde_json::json!({
            "title": "Follow-up",
            "body": "Second message",
            "saveToHistory": false
        })),
    )
    .await;
    assert_eq!(json["sent"], 1);
    assert_eq!(json["failed"], 0);
    assert!(json.get("campaignId").is_none());

    let (status, json) = call(
        create_router(state.clone()),
        "GET",
        &format!("/api/push/campaigns/{}", campaign_id),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "sent");
    assert_eq!(json["stats"]["sent"], 1);
    assert_eq!(json["stats"]["failed"], 1);
    assert_eq!(json["issuedByName"], "root");

    let (status, json) = call(
        create_router(state),
        "GET",
        "/api/push/campaigns?limit=10",
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_track_updates_stats_after_completion() {
    let state = build_state(Some(FakeTransport::default()));
    let (_, alice) = token_for(Role::User, "alice");
    subscribe(&state, &alice, "https://push.example/alice").await;

    let (_, admin) = token_for(Role::Admin, "root");
    let (_, json) = call(
        create_router(state.clone()),
        "POST",
        "/api/push/send",
        Some(&admin),
        Some(serde_json::json!({ "title": "Hi", "body": "There" })),
    )
    .await;
    let campaign_id = json["campaignId"].as_str().unwrap().to_string();

    for event in ["delivered", "clicked"] {
        let (status, json) = call(
            create_router(state.clone()),
            "POST",
            "/api/push/track",
            None,
            Some(serde_json::json!({
                "campaignId": campaign_id,
                "event": event,
                "endpoint": "https://push.example/alice"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
    }

    let (_, json) = call(
        create_router(state),
        "GET",
        &format!("/api/push/campaigns/{}", campaign_id),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(json["status"], "sent");
    assert_eq!(json["stats"]["delivered"], 1);
    assert_eq!(json["stats"]["clicked"], 1);
}

#[tokio::test]
async fn test_track_unknown_campaign_is_not_found() {
    let state = build_state(Some(FakeTransport::default()));

    let (status, _) = call(
        create_router(state),
        "POST",
        "/api/push/track",
        None,
        Some(serde_json::json!({
            "campaignId": Uuid::new_v4(),
            "event": "clicked"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unsubscribe_only_own_endpoint() {
    let state = build_state(Some(FakeTransport::default()));
    let (_, alice) = token_for(Role::User, "alice");
    let (_, mallory) = token_for(Role::User, "mallory");
    subscribe(&state, &alice, "https://push.example/alice").await;

    let (status, json) = call(
        create_router(state.clone()),
        "POST",
        "/api/push/unsubscribe",
        Some(&mallory),
        Some(serde_json::json!({ "endpoint": "https://push.example/alice" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["removed"], false);

    let (_, json) = call(
        create_router(state),
        "POST",
        "/api/push/unsubscribe",
        Some(&alice),
        Some(serde_json::json!({ "endpoint": "https://push.example/alice" })),
    )
    .await;
    assert_eq!(json["removed"], true);
}

#[tokio::test]
async fn test_campaign_not_found() {
    let state = build_state(Some(FakeTransport::default()));
    let (_, admin) = token_for(Role::Admin, "root");

    let (status, _) = call(
        create_router(state),
        "GET",
        &format!("/api/push/campaigns/{}", Uuid::new_v4()),
        Some(&admin),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
