//! Push notification gateway library.

// Core subsystems
pub mod config;
pub mod http;
pub mod push;
pub mod remote;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::schema::GatewayConfig;
pub use http::{AppState, GatewayServer};
pub use lifecycle::Shutdown;
