//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the push gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, request limits).
    pub listener: ListenerConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Push delivery settings (VAPID, fan-out bounds).
    pub push: PushConfig,

    /// Session verification settings.
    pub session: SessionConfig,

    /// Remote data service settings.
    pub remote: RemoteConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Request timeout (total time for request/response) in seconds.
    pub request_timeout_secs: u64,

    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
            max_body_size: 64 * 1024,
        }
    }
}

/// Fixed policy for one limiter class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct LimitPolicy {
    /// Requests admitted per window.
    pub limit: u32,

    /// Sliding window length in seconds.
    pub window_secs: u64,
}

impl LimitPolicy {
    pub const fn new(limit: u32, window_secs: u64) -> Self {
        Self { limit, window_secs }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Shared counter store. Without it the limiter fails open.
    pub redis_url: Option<String>,

    /// Deadline for a single counter store round trip, in milliseconds.
    pub store_timeout_ms: u64,

    /// Keep counters in process memory when no `redis_url` is set.
    /// Only correct for a single gateway instance.
    pub local_counters: bool,

    /// How often idle in-memory keys are purged, in seconds.
    pub purge_interval_secs: u64,

    /// General API policy.
    pub api: LimitPolicy,

    /// Authentication policy.
    pub auth: LimitPolicy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            redis_url: None,
            store_timeout_ms: 500,
            local_counters: false,
            purge_interval_secs: 60,
            api: LimitPolicy::new(20, 60),
            auth: LimitPolicy::new(5, 60),
        }
    }
}

impl RateLimitConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs)
    }

    /// Longest window of any class; keys idle for longer hold no events.
    pub fn longest_window(&self) -> Duration {
        self.api.window().max(self.auth.window())
    }
}

/// Push delivery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PushConfig {
    /// Base64url (no padding) encoded P-256 private key.
    pub vapid_private_key: Option<String>,

    /// Base64url (no padding) encoded uncompressed public key.
    pub vapid_public_key: Option<String>,

    /// Contact URI placed in the `sub` claim.
    pub vapid_subject: Option<String>,

    /// Shared secret expected in `Authorization: Bearer` on `/push-send`.
    pub send_secret: Option<String>,

    /// Simultaneous in-flight deliveries per dispatch.
    pub max_concurrency: usize,

    /// Deadline for one delivery attempt, in milliseconds.
    pub attempt_timeout_ms: u64,

    /// Deadline for a whole dispatch, in milliseconds.
    pub dispatch_timeout_ms: u64,

    /// Seconds the push service may hold an undelivered message.
    pub ttl_secs: u32,

    /// Icon shown by receiving clients.
    pub icon: String,

    /// Badge shown by receiving clients.
    pub badge: String,

    /// Click-through target when the sender gives none.
    pub default_url: String,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            vapid_private_key: None,
            vapid_public_key: None,
            vapid_subject: None,
            send_secret: None,
            max_concurrency: 50,
            attempt_timeout_ms: 10_000,
            dispatch_timeout_ms: 15_000,
            ttl_secs: 86_400,
            icon: "/icons/icon-192x192.png".to_string(),
            badge: "/icons/icon-72x72.png".to_string(),
            default_url: "/notifications".to_string(),
        }
    }
}

impl PushConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }
}

/// Session verification configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// HS256 secret used to verify session tokens.
    pub secret: Option<String>,

    /// Cookie carrying the session token when no bearer header is sent.
    pub cookie_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: None,
            cookie_name: "session".to_string(),
        }
    }
}

/// Declared shape of one allow-listed remote path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RemotePathRule {
    /// Fields that must be present in the query (read) or payload (write).
    pub required: Vec<String>,
}

/// Remote data service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base address of the remote data service.
    pub base_url: Option<String>,

    /// Secret appended to every forwarded call as `key`.
    pub api_key: Option<String>,

    /// Deadline for one remote call, in milliseconds.
    pub timeout_ms: u64,

    /// Logical paths clients may read, with their declared shape.
    pub read_paths: BTreeMap<String, RemotePathRule>,

    /// Logical paths clients may write, with their declared shape.
    pub write_paths: BTreeMap<String, RemotePathRule>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            timeout_ms: 10_000,
            read_paths: BTreeMap::new(),
            write_paths: BTreeMap::new(),
        }
    }
}

impl RemoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human readable format.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
