//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → CLI/env overrides for secrets (main.rs)
//!     → GatewayConfig (validated, immutable)
//!     → handed explicitly to every subsystem at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Business logic never reads the process environment

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    GatewayConfig, LimitPolicy, ListenerConfig, ObservabilityConfig, PushConfig,
    RateLimitConfig, RemoteConfig, RemotePathRule, SessionConfig,
};
