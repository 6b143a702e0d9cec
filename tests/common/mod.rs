//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, Response};
use jwt_simple::prelude::{Claims, Duration, HS256Key, MACLike};
use push_gateway::config::GatewayConfig;
use push_gateway::push::{DeliveryError, PushSubscription, PushTransport};
use push_gateway::security::auth::SessionClaims;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

pub const HOST: &str = "portal.example";
pub const ORIGIN: &str = "https://portal.example";
pub const SESSION_SECRET: &str = "integration-session-secret";
pub const SEND_SECRET: &str = "integration-send-secret";

/// Config with secrets set and no external services.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.session.secret = Some(SESSION_SECRET.to_string());
    config.push.send_secret = Some(SEND_SECRET.to_string());
    config.push.attempt_timeout_ms = 200;
    config.push.dispatch_timeout_ms = 2_000;
    config
}

/// A signed session token for `student_id`.
pub fn session_token(student_id: &str) -> String {
    let claims = Claims::with_custom_claims(
        SessionClaims {
            student_id: student_id.to_string(),
        },
        Duration::from_hours(1),
    )
    .with_subject(format!("user-{student_id}"));
    HS256Key::from_bytes(SESSION_SECRET.as_bytes())
        .authenticate(claims)
        .unwrap()
}

/// A same-origin JSON request from a browser session.
pub fn browser_request(method: Method, uri: &str, student_id: Option<&str>, body: serde_json::Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::HOST, HOST)
        .header(header::ORIGIN, ORIGIN)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(student_id) = student_id {
        builder = builder.header(
            header::AUTHORIZATION,
            format!("Bearer {}", session_token(student_id)),
        );
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// A backend job calling `/push-send`.
pub fn send_request(secret: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/push-send")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {secret}"))
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn subscribe_body(endpoint: &str, student_id: &str) -> serde_json::Value {
    serde_json::json!({
        "subscription": {
            "endpoint": endpoint,
            "keys": { "p256dh": "k1", "auth": "a1" }
        },
        "studentId": student_id
    })
}

/// Push transport answering from a per-endpoint script.
#[derive(Default)]
pub struct MockTransport {
    statuses: HashMap<String, Option<u16>>,
    delivered: Mutex<Vec<(String, String)>>,
}

impl MockTransport {
    /// Make deliveries to `endpoint` fail with `status` (`None` = unreachable).
    pub fn failing(mut self, endpoint: &str, status: Option<u16>) -> Self {
        self.statuses.insert(endpoint.to_string(), status);
        self
    }

    /// `(endpoint, message)` of every attempt, in order.
    pub fn delivered(&self) -> Vec<(String, String)> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushTransport for MockTransport {
    async fn deliver(
        &self,
        subscription: &PushSubscription,
        message: &str,
    ) -> Result<(), DeliveryError> {
        self.delivered
            .lock()
            .unwrap()
            .push((subscription.endpoint.clone(), message.to_string()));
        match self.statuses.get(&subscription.endpoint) {
            Some(status) => Err(DeliveryError::Transport {
                status: *status,
                message: "mock failure".to_string(),
            }),
            None => Ok(()),
        }
    }
}

/// One request seen by the mock remote service.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub target: String,
    pub body: String,
}

impl RecordedRequest {
    /// Decoded query pairs of the request target.
    pub fn query(&self) -> Vec<(String, String)> {
        url::Url::parse(&format!("http://mock{}", self.target))
            .map(|u| u.query_pairs().into_owned().collect())
            .unwrap_or_default()
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

/// Start a programmable mock remote data service on an ephemeral port.
pub async fn start_mock_remote<F, Fut>(f: F) -> (SocketAddr, Arc<Mutex<Vec<RecordedRequest>>>)
where
    F: Fn(RecordedRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let f = Arc::new(f);

    let recorded = seen.clone();
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    let f = f.clone();
                    let recorded = recorded.clone();
                    tokio::spawn(async move {
                        let (read_half, mut write_half) = socket.into_split();
                        let mut reader = BufReader::new(read_half);

                        let mut request_line = String::new();
                        if reader.read_line(&mut request_line).await.is_err() {
                            return;
                        }
                        let mut parts = request_line.split_whitespace();
                        let method = parts.next().unwrap_or_default().to_string();
                        let target = parts.next().unwrap_or_default().to_string();

                        let mut content_length = 0usize;
                        loop {
                            let mut line = String::new();
                            match reader.read_line(&mut line).await {
                                Ok(0) | Err(_) => break,
                                Ok(_) => {}
                            }
                            let line = line.trim_end();
                            if line.is_empty() {
                                break;
                            }
                            if let Some((name, value)) = line.split_once(':') {
                                if name.eq_ignore_ascii_case("content-length") {
                                    content_length = value.trim().parse().unwrap_or(0);
                                }
                            }
                        }
                        let mut body = vec![0u8; content_length];
                        if reader.read_exact(&mut body).await.is_err() {
                            return;
                        }

                        let request = RecordedRequest {
                            method,
                            target,
                            body: String::from_utf8_lossy(&body).into_owned(),
                        };
                        recorded.lock().unwrap().push(request.clone());

                        let (status, body) = f(request).await;
                        let status_text = match status {
                            200 => "200 OK",
                            400 => "400 Bad Request",
                            404 => "404 Not Found",
                            500 => "500 Internal Server Error",
                            502 => "502 Bad Gateway",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };
                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text,
                            body.len(),
                            body
                        );
                        let _ = write_half.write_all(response.as_bytes()).await;
                        let _ = write_half.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, seen)
}
