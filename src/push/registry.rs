//! Subscription registry.
//!
//! # Responsibilities
//! - Validate and upsert subscriptions keyed by endpoint
//! - Remove subscriptions (absence is not an error)
//! - Expose all active subscriptions as a lazy stream
//!
//! # Design Decisions
//! - Storage is behind the `SubscriptionStore` capability; the registry owns
//!   only validation and idempotence semantics
//! - Re-registering an endpoint refreshes its keys and keeps its first owner
//! - Correctness under concurrency relies on the store's own upsert-by-key

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::stream::{self, BoxStream, StreamExt};
use thiserror::Error;

use crate::observability::metrics;
use crate::push::types::PushSubscription;

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A required field was empty.
    #[error("{0} is required")]
    Validation(&'static str),

    /// The backing store failed or could not be reached.
    #[error("subscription store error: {0}")]
    Store(String),
}

/// Capability interface over whatever holds subscription records.
#[async_trait]
pub trait SubscriptionStore: Send + Sync + 'static {
    /// Insert a record, or refresh the keys of the record with the same endpoint.
    async fn upsert(&self, subscription: PushSubscription) -> Result<(), RegistryError>;

    /// Remove the record for `endpoint`. Returns whether one existed.
    async fn delete(&self, endpoint: &str) -> Result<bool, RegistryError>;

    /// Every stored record.
    fn list(&self) -> BoxStream<'_, Result<PushSubscription, RegistryError>>;
}

/// In-process store keyed by endpoint.
#[derive(Clone, Default)]
pub struct MemorySubscriptionStore {
    inner: Arc<DashMap<String, PushSubscription>>,
}

impl MemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn get(&self, endpoint: &str) -> Option<PushSubscription> {
        self.inner.get(endpoint).map(|r| r.value().clone())
    }
}

#[async_trait]
impl SubscriptionStore for MemorySubscriptionStore {
    async fn upsert(&self, subscription: PushSubscription) -> Result<(), RegistryError> {
        self.inner
            .entry(subscription.endpoint.clone())
            .and_modify(|existing| {
                existing.p256dh.clone_from(&subscription.p256dh);
                existing.auth.clone_from(&subscription.auth);
            })
            .or_insert(subscription);
        Ok(())
    }

    async fn delete(&self, endpoint: &str) -> Result<bool, RegistryError> {
        Ok(self.inner.remove(endpoint).is_some())
    }

    fn list(&self) -> BoxStream<'_, Result<PushSubscription, RegistryError>> {
        // Snapshot first so no shard lock is held while the caller awaits.
        let snapshot: Vec<_> = self.inner.iter().map(|r| Ok(r.value().clone())).collect();
        stream::iter(snapshot).boxed()
    }
}

/// Subscription registry over a shared store.
#[derive(Clone)]
pub struct SubscriptionRegistry {
    store: Arc<dyn SubscriptionStore>,
}

impl SubscriptionRegistry {
    pub fn new(store: Arc<dyn SubscriptionStore>) -> Self {
        Self { store }
    }

    /// Register or refresh a subscription. Idempotent for identical arguments.
    pub async fn subscribe(
        &self,
        student_id: &str,
        endpoint: &str,
        p256dh: &str,
        auth: &str,
    ) -> Result<(), RegistryError> {
        let student_id = required("studentId", student_id)?;
        let endpoint = required("endpoint", endpoint)?;
        let p256dh = required("p256dh", p256dh)?;
        let auth = required("auth", auth)?;

        self.store
            .upsert(PushSubscription {
                student_id: student_id.to_string(),
                endpoint: endpoint.to_string(),
                p256dh: p256dh.to_string(),
                auth: auth.to_string(),
            })
            .await?;

        metrics::record_subscription_event("subscribe");
        tracing::debug!(student_id = %student_id, "Subscription stored");
        Ok(())
    }

    /// Remove a subscription. Unknown endpoints count as already unsubscribed.
    pub async fn unsubscribe(&self, endpoint: &str) -> Result<(), RegistryError> {
        let endpoint = required("endpoint", endpoint)?;
        let existed = self.store.delete(endpoint).await?;
        metrics::record_subscription_event("unsubscribe");
        tracing::debug!(existed, "Subscription removed");
        Ok(())
    }

    /// All current subscriptions, in no particular order.
    pub fn list_active(&self) -> BoxStream<'_, Result<PushSubscription, RegistryError>> {
        self.store.list()
    }
}

fn required<'a>(field: &'static str, value: &'a str) -> Result<&'a str, RegistryError> {
    let value = value.trim();
    if value.is_empty() {
        Err(RegistryError::Validation(field))
    } else {
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::TryStreamExt;

    fn registry() -> (SubscriptionRegistry, MemorySubscriptionStore) {
        let store = MemorySubscriptionStore::new();
        (SubscriptionRegistry::new(Arc::new(store.clone())), store)
    }

    #[tokio::test]
    async fn test_subscribe_is_idempotent() {
        let (registry, store) = registry();

        registry.subscribe("s001", "E1", "k1", "a1").await.unwrap();
        registry.subscribe("s001", "E1", "k1", "a1").await.unwrap();

        let active: Vec<_> = registry.list_active().try_collect().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].endpoint, "E1");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_resubscribe_refreshes_keys_and_keeps_owner() {
        let (registry, store) = registry();

        registry.subscribe("s001", "E1", "k1", "a1").await.unwrap();
        registry.subscribe("s002", "E1", "k2", "a2").await.unwrap();

        let stored = store.get("E1").unwrap();
        assert_eq!(stored.student_id, "s001");
        assert_eq!(stored.p256dh, "k2");
        assert_eq!(stored.auth, "a2");
    }

    #[tokio::test]
    async fn test_subscribe_rejects_empty_fields() {
        let (registry, store) = registry();

        assert_eq!(
            registry.subscribe("s001", "E1", " ", "a1").await,
            Err(RegistryError::Validation("p256dh"))
        );
        assert_eq!(
            registry.subscribe("", "E1", "k1", "a1").await,
            Err(RegistryError::Validation("studentId"))
        );
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_unknown_endpoint_succeeds() {
        let (registry, _) = registry();
        assert_eq!(registry.unsubscribe("https://unknown").await, Ok(()));
    }

    #[tokio::test]
    async fn test_unsubscribe_removes_record() {
        let (registry, store) = registry();
        registry.subscribe("s001", "E1", "k1", "a1").await.unwrap();

        registry.unsubscribe("E1").await.unwrap();

        assert!(store.is_empty());
    }
}
