//! End-to-end tests for the push endpoints, driven through the full router.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use push_gateway::config::{GatewayConfig, LimitPolicy};
use push_gateway::push::MemorySubscriptionStore;
use push_gateway::security::MemoryCounterStore;
use push_gateway::{AppState, GatewayServer};
use serde_json::json;
use tower::ServiceExt;

mod common;

use common::{browser_request, send_request, subscribe_body, MockTransport, SEND_SECRET};

struct Harness {
    app: Router,
    store: MemorySubscriptionStore,
    state: AppState,
}

fn harness(config: GatewayConfig, transport: Option<Arc<MockTransport>>) -> Harness {
    let store = MemorySubscriptionStore::new();
    let mut state = AppState::new(config, Arc::new(store.clone()))
        .with_counter_store(Arc::new(MemoryCounterStore::new()));
    if let Some(transport) = transport {
        state = state.with_transport(transport);
    }
    let app = GatewayServer::new(state.clone()).router();
    Harness { app, store, state }
}

#[tokio::test]
async fn test_health_needs_no_origin() {
    let h = harness(common::test_config(), None);

    let response = h
        .app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_cross_origin_subscribe_is_forbidden() {
    let h = harness(common::test_config(), None);
    let mut request = browser_request(
        Method::POST,
        "/push-subscribe",
        Some("s001"),
        subscribe_body("https://push.example/E1", "s001"),
    );
    request
        .headers_mut()
        .insert(header::ORIGIN, "https://evil.example".parse().unwrap());

    let response = h.app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_non_json_subscribe_is_unsupported() {
    let h = harness(common::test_config(), None);
    let mut request = browser_request(
        Method::POST,
        "/push-subscribe",
        Some("s001"),
        subscribe_body("https://push.example/E1", "s001"),
    );
    request
        .headers_mut()
        .insert(header::CONTENT_TYPE, "text/plain".parse().unwrap());

    let response = h.app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_subscribe_is_idempotent() {
    let h = harness(common::test_config(), None);

    for _ in 0..2 {
        let response = h
            .app
            .clone()
            .oneshot(browser_request(
                Method::POST,
                "/push-subscribe",
                Some("s001"),
                subscribe_body("https://push.example/E1", "s001"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-ratelimit-remaining"));
        assert_eq!(common::body_json(response).await, json!({ "success": true }));
    }

    assert_eq!(h.store.len(), 1);
    assert_eq!(h.store.get("https://push.example/E1").unwrap().student_id, "s001");
}

#[tokio::test]
async fn test_subscribe_requires_session() {
    let h = harness(common::test_config(), None);

    let response = h
        .app
        .oneshot(browser_request(
            Method::POST,
            "/push-subscribe",
            None,
            subscribe_body("https://push.example/E1", "s001"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(common::body_json(response).await["error"].is_string());
}

#[tokio::test]
async fn test_subscribe_for_another_student_is_forbidden() {
    let h = harness(common::test_config(), None);

    let response = h
        .app
        .oneshot(browser_request(
            Method::POST,
            "/push-subscribe",
            Some("s001"),
            subscribe_body("https://push.example/E1", "s002"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_subscribe_missing_fields_is_bad_request() {
    let h = harness(common::test_config(), None);
    let body = json!({
        "subscription": { "endpoint": "https://push.example/E1", "keys": { "auth": "a1" } },
        "studentId": "s001"
    });

    let response = h
        .app
        .oneshot(browser_request(Method::POST, "/push-subscribe", Some("s001"), body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(common::body_json(response).await["error"], "p256dh is required");
}

#[tokio::test]
async fn test_unsubscribe_unknown_endpoint_succeeds() {
    let h = harness(common::test_config(), None);

    let response = h
        .app
        .oneshot(browser_request(
            Method::DELETE,
            "/push-subscribe",
            Some("s001"),
            json!({ "endpoint": "https://unknown" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(common::body_json(response).await, json!({ "success": true }));
}

#[tokio::test]
async fn test_api_rate_limit_returns_retry_metadata() {
    let mut config = common::test_config();
    config.rate_limit.api = LimitPolicy::new(2, 60);
    let h = harness(config, None);

    let attempt = |ip: &'static str| {
        let mut request = browser_request(
            Method::DELETE,
            "/push-subscribe",
            Some("s001"),
            json!({ "endpoint": "https://push.example/E1" }),
        );
        request
            .headers_mut()
            .insert("x-forwarded-for", ip.parse().unwrap());
        h.app.clone().oneshot(request)
    };

    assert_eq!(attempt("203.0.113.1").await.unwrap().status(), StatusCode::OK);
    assert_eq!(attempt("203.0.113.1").await.unwrap().status(), StatusCode::OK);

    let denied = attempt("203.0.113.1").await.unwrap();
    assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
    let headers = denied.headers();
    assert_eq!(headers["x-ratelimit-limit"], "2");
    assert_eq!(headers["x-ratelimit-remaining"], "0");
    assert!(headers.contains_key("x-ratelimit-reset"));
    let retry_after: u64 = headers["retry-after"].to_str().unwrap().parse().unwrap();
    assert!(retry_after > 0 && retry_after <= 60);

    // Another client has its own window.
    assert_eq!(attempt("203.0.113.2").await.unwrap().status(), StatusCode::OK);
}

#[tokio::test]
async fn test_send_rejects_wrong_secret() {
    let h = harness(common::test_config(), Some(Arc::new(MockTransport::default())));

    let response = h
        .app
        .oneshot(send_request("integration-send-secreT", json!({ "title": "New event" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_send_without_vapid_is_unavailable() {
    let h = harness(common::test_config(), None);

    let response = h
        .app
        .oneshot(send_request(SEND_SECRET, json!({ "title": "New event" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_send_requires_title() {
    let h = harness(common::test_config(), Some(Arc::new(MockTransport::default())));

    let response = h
        .app
        .oneshot(send_request(SEND_SECRET, json!({ "body": "no title" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(common::body_json(response).await["error"], "title is required");
}

#[tokio::test]
async fn test_subscribe_then_send_delivers() {
    let transport = Arc::new(MockTransport::default());
    let h = harness(common::test_config(), Some(transport.clone()));

    let response = h
        .app
        .clone()
        .oneshot(browser_request(
            Method::POST,
            "/push-subscribe",
            Some("s001"),
            subscribe_body("E1", "s001"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = h
        .app
        .oneshot(send_request(SEND_SECRET, json!({ "title": "New event" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        common::body_json(response).await,
        json!({ "success": true, "sent": 1, "failed": 0, "total": 1 })
    );

    let delivered = transport.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].0, "E1");
    let message: serde_json::Value = serde_json::from_str(&delivered[0].1).unwrap();
    assert_eq!(message["title"], "New event");
    assert_eq!(message["url"], "/notifications");
    assert!(h.store.get("E1").is_some());
}

#[tokio::test]
async fn test_send_prunes_gone_endpoints_only() {
    let transport = Arc::new(
        MockTransport::default()
            .failing("gone", Some(410))
            .failing("flaky", Some(503)),
    );
    let h = harness(common::test_config(), Some(transport));
    for endpoint in ["ok", "gone", "flaky"] {
        h.state
            .registry
            .subscribe("s001", endpoint, "k", "a")
            .await
            .unwrap();
    }

    let response = h
        .app
        .oneshot(send_request(SEND_SECRET, json!({ "title": "New event", "tag": "t1" })))
        .await
        .unwrap();
    assert_eq!(
        common::body_json(response).await,
        json!({ "success": true, "sent": 1, "failed": 2, "total": 3 })
    );

    let dispatcher = h.state.dispatcher.as_ref().unwrap();
    assert_eq!(dispatcher.pruner().drain(Duration::from_secs(1)).await, 0);
    assert!(h.store.get("gone").is_none());
    assert!(h.store.get("flaky").is_some());
    assert!(h.store.get("ok").is_some());
}

#[tokio::test]
async fn test_send_is_rate_limited_by_auth_class() {
    let mut config = common::test_config();
    config.rate_limit.auth = LimitPolicy::new(1, 60);
    let h = harness(config, Some(Arc::new(MockTransport::default())));

    let first = h
        .app
        .clone()
        .oneshot(send_request("wrong", json!({ "title": "x" })))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::UNAUTHORIZED);

    let second = h
        .app
        .oneshot(send_request(SEND_SECRET, json!({ "title": "x" })))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_public_key_endpoint() {
    let h = harness(common::test_config(), None);
    let response = h
        .app
        .oneshot(Request::get("/push-public-key").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let mut config = common::test_config();
    config.push.vapid_public_key = Some("BPublicKey".to_string());
    let h = harness(config, None);
    let response = h
        .app
        .oneshot(Request::get("/push-public-key").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        common::body_json(response).await,
        json!({ "publicKey": "BPublicKey" })
    );
}

#[tokio::test]
async fn test_limiter_without_store_fails_open() {
    let mut config = common::test_config();
    config.rate_limit.api = LimitPolicy::new(1, 60);
    let store = MemorySubscriptionStore::new();
    let app = GatewayServer::new(AppState::new(config, Arc::new(store))).router();

    for _ in 0..3 {
        let response = app
            .clone()
            .oneshot(browser_request(
                Method::DELETE,
                "/push-subscribe",
                Some("s001"),
                json!({ "endpoint": "E1" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
