//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request id, trace, timeout, body limit)
//!     → security gate + rate limit (per route group)
//!     → handlers.rs (subscribe, unsubscribe, send, public key, health)
//!     → proxy.rs (remote data service read/write)
//!     → response.rs (error mapping)
//!     → Send to client
//! ```

pub mod handlers;
pub mod proxy;
pub mod response;
pub mod server;

pub use response::ApiError;
pub use server::{AppState, GatewayServer};
