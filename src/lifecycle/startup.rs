//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize all collaborators from a validated config, in dependency order
//! - Degrade optional ones (counter store, push sending) with a warning
//!
//! # Design Decisions
//! - Fail fast only on what cannot degrade (remote service misconfiguration)
//! - An unreachable Redis leaves the limiter failing open, not the process down;
//!   the store keeps trying and the limiter recovers once Redis answers
//! - In-memory counters are opt-in and their purge task stops on shutdown
//! - Missing or inconsistent VAPID keys disable sending; subscribing keeps working

use std::sync::Arc;

use thiserror::Error;

use crate::config::{GatewayConfig, RateLimitConfig};
use crate::http::AppState;
use crate::lifecycle::Shutdown;
use crate::push::{MemorySubscriptionStore, SubscriptionStore, VapidKeys, WebPushTransport};
use crate::remote::{RemoteDataClient, RemoteError, RemoteSubscriptionStore};
use crate::security::{CounterStore, MemoryCounterStore, RedisCounterStore, StoreError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("remote data service: {0}")]
    Remote(#[from] RemoteError),

    #[error("rate limit store: {0}")]
    CounterStore(#[from] StoreError),
}

/// Build the application state for `config`.
///
/// Background tasks started here stop when `shutdown` is triggered.
pub async fn build_state(
    config: GatewayConfig,
    shutdown: &Shutdown,
) -> Result<AppState, StartupError> {
    let remote = RemoteDataClient::from_config(&config.remote)?;

    let subscriptions: Arc<dyn SubscriptionStore> = match &remote {
        Some(client) => {
            tracing::info!(base_url = %client.base_url().origin().ascii_serialization(), "Subscriptions stored in remote data service");
            Arc::new(RemoteSubscriptionStore::new(client.clone()))
        }
        None => {
            tracing::warn!("No remote data service configured, subscriptions are kept in memory");
            Arc::new(MemorySubscriptionStore::new())
        }
    };

    let counters = counter_store(&config.rate_limit, shutdown).await?;

    let transport = match VapidKeys::from_config(&config.push) {
        Ok(Some(keys)) => match WebPushTransport::new(keys, config.push.ttl_secs) {
            Ok(transport) => Some(transport),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to initialize push client, sending disabled");
                None
            }
        },
        Ok(None) => {
            tracing::warn!("VAPID keys not configured, sending disabled");
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, "VAPID configuration rejected, sending disabled");
            None
        }
    };

    let mut state = AppState::new(config, subscriptions);
    if let Some(client) = remote {
        state = state.with_remote(client);
    }
    if let Some(store) = counters {
        state = state.with_counter_store(store);
    }
    if let Some(transport) = transport {
        state = state.with_transport(Arc::new(transport));
    }
    Ok(state)
}

async fn counter_store(
    config: &RateLimitConfig,
    shutdown: &Shutdown,
) -> Result<Option<Arc<dyn CounterStore>>, StartupError> {
    if !config.enabled {
        tracing::info!("Rate limiting disabled");
        return Ok(None);
    }

    if let Some(url) = config.redis_url.as_deref() {
        let store = RedisCounterStore::new(url, config.store_timeout())?;
        match store.connect().await {
            Ok(()) => tracing::info!("Rate limit counters shared through Redis"),
            Err(e) => tracing::warn!(
                error = %e,
                "Rate limit store unreachable, limiter fails open until it connects"
            ),
        }
        let store: Arc<dyn CounterStore> = Arc::new(store);
        return Ok(Some(store));
    }

    if config.local_counters {
        let store = MemoryCounterStore::new();
        store.spawn_purge_task(
            config.longest_window(),
            config.purge_interval(),
            shutdown.subscribe(),
        );
        tracing::info!("Rate limit counters kept in process memory");
        let store: Arc<dyn CounterStore> = Arc::new(store);
        return Ok(Some(store));
    }

    tracing::warn!("No rate limit store configured, limiter fails open");
    Ok(None)
}
