//! Remote data service subsystem.
//!
//! # Data Flow
//! ```text
//! proxy handlers (GET/POST /gas) ──┐
//!                                  ├→ client.rs (envelope, timeout, api key) → remote service
//! store.rs (subscriptions) ────────┘
//! ```
//!
//! # Design Decisions
//! - The remote address and api key never reach clients
//! - Envelopes are passed through by the proxy, decoded only by the store

pub mod client;
pub mod store;

pub use client::{Envelope, RemoteDataClient, RemoteError, RemoteResponse};
pub use store::RemoteSubscriptionStore;
