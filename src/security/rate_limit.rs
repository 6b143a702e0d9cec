//! Sliding-window rate limiting with per-class policies.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::{LimitPolicy, RateLimitConfig};
use crate::http::response::ApiError;
use crate::observability::metrics;
use crate::security::client_ip::client_identity;
use crate::security::counter_store::CounterStore;
use crate::security::origin::is_mutating;

/// Which policy a request is counted against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimiterClass {
    /// General API writes.
    Api,
    /// Credential-checking endpoints.
    Auth,
}

impl LimiterClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimiterClass::Api => "api",
            LimiterClass::Auth => "auth",
        }
    }
}

/// Outcome of one limiter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at_epoch_millis: i64,
}

impl RateLimitDecision {
    /// Whole seconds until the oldest event leaves the window, never negative.
    pub fn retry_after_secs(&self, now_ms: i64) -> u64 {
        let millis = (self.reset_at_epoch_millis - now_ms).max(0) as u64;
        millis.div_ceil(1000)
    }

    /// Write the `X-RateLimit-*` headers.
    pub fn apply_headers(&self, headers: &mut HeaderMap) {
        headers.insert("x-ratelimit-limit", HeaderValue::from(self.limit));
        headers.insert("x-ratelimit-remaining", HeaderValue::from(self.remaining));
        headers.insert(
            "x-ratelimit-reset",
            HeaderValue::from(self.reset_at_epoch_millis),
        );
    }
}

pub fn now_epoch_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Window-based limiter over a shared counter store.
///
/// Fails open: disabled, unconfigured or failing stores admit every request.
pub struct RateLimiter {
    enabled: bool,
    api: LimitPolicy,
    auth: LimitPolicy,
    store: Option<Arc<dyn CounterStore>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig, store: Option<Arc<dyn CounterStore>>) -> Self {
        Self {
            enabled: config.enabled,
            api: config.api,
            auth: config.auth,
            store,
        }
    }

    pub fn policy(&self, class: LimiterClass) -> LimitPolicy {
        match class {
            LimiterClass::Api => self.api,
            LimiterClass::Auth => self.auth,
        }
    }

    pub async fn check(&self, class: LimiterClass, identifier: &str) -> RateLimitDecision {
        self.check_at(class, identifier, now_epoch_millis()).await
    }

    pub async fn check_at(
        &self,
        class: LimiterClass,
        identifier: &str,
        now_ms: i64,
    ) -> RateLimitDecision {
        let policy = self.policy(class);
        let window_ms = policy.window().as_millis() as i64;
        let open = RateLimitDecision {
            allowed: true,
            limit: policy.limit,
            remaining: policy.limit,
            reset_at_epoch_millis: now_ms + window_ms,
        };

        let store = match (&self.store, self.enabled) {
            (Some(store), true) => store,
            _ => return open,
        };

        let key = format!("ratelimit:{}:{}", class.as_str(), identifier);
        match store.hit(&key, policy.limit, policy.window(), now_ms).await {
            Ok(state) => {
                metrics::record_rate_limit_decision(class.as_str(), state.allowed);
                RateLimitDecision {
                    allowed: state.allowed,
                    limit: policy.limit,
                    remaining: policy.limit.saturating_sub(state.count),
                    reset_at_epoch_millis: state.oldest_ms + window_ms,
                }
            }
            Err(e) => {
                metrics::record_rate_limit_store_error();
                tracing::warn!(class = class.as_str(), error = %e, "Rate limit store unavailable, allowing request");
                open
            }
        }
    }
}

/// Middleware state: the shared limiter plus the class this route counts against.
#[derive(Clone)]
pub struct RateLimitGuard {
    pub limiter: Arc<RateLimiter>,
    pub class: LimiterClass,
}

impl RateLimitGuard {
    pub fn new(limiter: Arc<RateLimiter>, class: LimiterClass) -> Self {
        Self { limiter, class }
    }
}

/// Middleware function for per-class rate limiting of mutating requests.
pub async fn rate_limit_middleware(
    State(guard): State<RateLimitGuard>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !is_mutating(request.method()) {
        return next.run(request).await;
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = client_identity(request.headers(), peer);

    let decision = guard.limiter.check(guard.class, &client).await;
    if !decision.allowed {
        tracing::warn!(client = %client, class = guard.class.as_str(), "Rate limit exceeded");
        metrics::record_rejection("rate_limited");
        return ApiError::RateLimited(decision).into_response();
    }

    let mut response = next.run(request).await;
    decision.apply_headers(response.headers_mut());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::counter_store::{MemoryCounterStore, StoreError, WindowState};
    use async_trait::async_trait;
    use std::time::Duration;

    fn config(limit: u32) -> RateLimitConfig {
        RateLimitConfig {
            api: LimitPolicy::new(limit, 60),
            auth: LimitPolicy::new(limit, 60),
            ..RateLimitConfig::default()
        }
    }

    fn limiter(limit: u32) -> RateLimiter {
        RateLimiter::new(&config(limit), Some(Arc::new(MemoryCounterStore::new())))
    }

    struct BrokenStore;

    #[async_trait]
    impl CounterStore for BrokenStore {
        async fn hit(
            &self,
            _key: &str,
            _limit: u32,
            _window: Duration,
            _now_ms: i64,
        ) -> Result<WindowState, StoreError> {
            Err(StoreError::Backend("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn test_boundary_and_reset() {
        let limiter = limiter(3);
        let start = 1_700_000_000_000;

        for i in 0..3 {
            let decision = limiter.check_at(LimiterClass::Api, "ip", start + i).await;
            assert!(decision.allowed);
            assert_eq!(decision.remaining, 2 - i as u32);
        }

        let denied = limiter.check_at(LimiterClass::Api, "ip", start + 10).await;
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert_eq!(denied.reset_at_epoch_millis, start + 60_000);

        let later = limiter
            .check_at(LimiterClass::Api, "ip", denied.reset_at_epoch_millis)
            .await;
        assert!(later.allowed);
    }

    #[tokio::test]
    async fn test_classes_are_counted_separately() {
        let limiter = limiter(1);
        assert!(limiter.check_at(LimiterClass::Api, "ip", 0).await.allowed);
        assert!(!limiter.check_at(LimiterClass::Api, "ip", 1).await.allowed);
        assert!(limiter.check_at(LimiterClass::Auth, "ip", 1).await.allowed);
    }

    #[tokio::test]
    async fn test_fails_open_without_store_or_on_error() {
        let unconfigured = RateLimiter::new(&config(1), None);
        for _ in 0..5 {
            assert!(unconfigured.check(LimiterClass::Auth, "ip").await.allowed);
        }

        let broken = RateLimiter::new(&config(1), Some(Arc::new(BrokenStore)));
        let decision = broken.check(LimiterClass::Api, "ip").await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1);
    }

    #[tokio::test]
    async fn test_disabled_limiter_admits_everything() {
        let mut disabled = config(1);
        disabled.enabled = false;
        let limiter = RateLimiter::new(&disabled, Some(Arc::new(MemoryCounterStore::new())));

        assert!(limiter.check(LimiterClass::Api, "ip").await.allowed);
        assert!(limiter.check(LimiterClass::Api, "ip").await.allowed);
    }

    #[test]
    fn test_retry_after_rounds_up_and_floors_at_zero() {
        let decision = RateLimitDecision {
            allowed: false,
            limit: 5,
            remaining: 0,
            reset_at_epoch_millis: 10_001,
        };
        assert_eq!(decision.retry_after_secs(0), 11);
        assert_eq!(decision.retry_after_secs(9_000), 2);
        assert_eq!(decision.retry_after_secs(10_001), 0);
        assert_eq!(decision.retry_after_secs(20_000), 0);
    }
}
