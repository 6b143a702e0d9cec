//! Push notification subsystem.
//!
//! # Data Flow
//! ```text
//! Subscribe / unsubscribe:
//!     → registry.rs (validate, upsert by endpoint)
//!     → SubscriptionStore (memory or remote data service)
//!
//! Send:
//!     → dispatcher.rs (fan-out, bounded concurrency, deadlines)
//!     → transport.rs (aes128gcm + VAPID via web-push)
//!     → gone endpoints pruned in the background
//! ```
//!
//! # Design Decisions
//! - Storage and delivery are both traits so tests run without network
//! - A dispatch never fails because one subscriber failed
//! - VAPID material comes from config and is checked as a pair at startup;
//!   `keygen` produces it

pub mod dispatcher;
pub mod registry;
pub mod transport;
pub mod types;
pub mod vapid;

pub use dispatcher::{DispatchError, DispatchLimits, Pruner, PushDispatcher};
pub use registry::{MemorySubscriptionStore, RegistryError, SubscriptionRegistry, SubscriptionStore};
pub use transport::{DeliveryError, PushTransport, WebPushTransport};
pub use types::{
    DeliveredMessage, DeliveryOutcome, DispatchSummary, NotificationPayload, Presentation,
    PushSubscription,
};
pub use vapid::{VapidError, VapidKeys};
