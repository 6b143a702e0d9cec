//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming mutating request:
//!     → origin.rs (Origin/Referer host check, JSON content type)
//!     → rate_limit.rs (per-client sliding window, class per route)
//!         → client_ip.rs (partition key)
//!         → counter_store.rs (atomic hit: memory or Redis)
//!     → auth.rs (session identity or shared send secret, in handlers)
//!     → Pass to handler
//! ```
//!
//! # Design Decisions
//! - Defense in depth: multiple layers of protection
//! - Gate and auth fail closed; the limiter alone fails open
//! - No trust in client input

pub mod auth;
pub mod client_ip;
pub mod counter_store;
pub mod origin;
pub mod rate_limit;

pub use auth::{send_secret_matches, AuthError, Identity, JwtSessionVerifier, SessionVerifier};
pub use counter_store::{CounterStore, MemoryCounterStore, RedisCounterStore, StoreError, WindowState};
pub use rate_limit::{LimiterClass, RateLimitDecision, RateLimitGuard, RateLimiter};
