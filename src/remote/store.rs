//! Subscription store backed by the remote data service.

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde_json::json;

use crate::push::registry::{RegistryError, SubscriptionStore};
use crate::push::types::PushSubscription;
use crate::remote::client::{RemoteDataClient, RemoteError};

pub const LIST_PATH: &str = "pushSubscriptions";
pub const SAVE_PATH: &str = "savePushSubscription";
pub const DELETE_PATH: &str = "deletePushSubscription";

/// Persists subscriptions through the remote data service.
///
/// Upsert-by-endpoint atomicity is the remote service's responsibility.
#[derive(Clone)]
pub struct RemoteSubscriptionStore {
    client: RemoteDataClient,
}

impl RemoteSubscriptionStore {
    pub fn new(client: RemoteDataClient) -> Self {
        Self { client }
    }
}

impl From<RemoteError> for RegistryError {
    fn from(err: RemoteError) -> Self {
        RegistryError::Store(err.to_string())
    }
}

#[async_trait]
impl SubscriptionStore for RemoteSubscriptionStore {
    async fn upsert(&self, subscription: PushSubscription) -> Result<(), RegistryError> {
        let payload = serde_json::to_value(&subscription)
            .map_err(|e| RegistryError::Store(e.to_string()))?;
        self.client.submit(SAVE_PATH, &payload).await?;
        Ok(())
    }

    async fn delete(&self, endpoint: &str) -> Result<bool, RegistryError> {
        let data = self
            .client
            .submit(DELETE_PATH, &json!({ "endpoint": endpoint }))
            .await?;
        let existed = data
            .as_ref()
            .and_then(|d| d.get("deleted"))
            .and_then(|d| d.as_bool())
            .unwrap_or(true);
        Ok(existed)
    }

    fn list(&self) -> BoxStream<'_, Result<PushSubscription, RegistryError>> {
        stream::once(self.client.fetch::<Option<Vec<PushSubscription>>>(LIST_PATH, &[]))
            .map_err(RegistryError::from)
            .map_ok(|records| {
                stream::iter(
                    records
                        .unwrap_or_default()
                        .into_iter()
                        .map(Ok::<_, RegistryError>),
                )
            })
            .try_flatten()
            .boxed()
    }
}
