//! Push fan-out.
//!
//! # Data Flow
//! ```text
//! dispatch(payload)
//!     → registry.list_active()            (empty → {0,0,0}, no network)
//!     → serialize DeliveredMessage once
//!     → one task per subscription, gated by a semaphore (max_concurrency)
//!         → transport.deliver() under attempt_timeout
//!     → collect until every task finished or dispatch_timeout passed
//!     → gone endpoints → Pruner (detached, best effort)
//!     → DispatchSummary { sent, failed = total - sent, total }
//! ```
//!
//! # Design Decisions
//! - One failing or hanging subscriber never delays the others
//! - Stragglers past the dispatch ceiling are aborted and counted as failed
//! - Only transport "gone" statuses prune; transient failures keep the record

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures_util::TryStreamExt;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::PushConfig;
use crate::observability::logging::endpoint_origin;
use crate::observability::metrics;
use crate::push::registry::{RegistryError, SubscriptionRegistry};
use crate::push::transport::{DeliveryError, PushTransport};
use crate::push::types::{
    DeliveredMessage, DeliveryOutcome, DispatchSummary, NotificationPayload, Presentation,
    PushSubscription,
};

/// Call-level dispatch failures. Per-subscriber failures never end up here.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("title is required")]
    MissingTitle,

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Fan-out bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchLimits {
    pub max_concurrency: usize,
    pub attempt_timeout: Duration,
    pub dispatch_timeout: Duration,
}

impl From<&PushConfig> for DispatchLimits {
    fn from(config: &PushConfig) -> Self {
        Self {
            max_concurrency: config.max_concurrency,
            attempt_timeout: config.attempt_timeout(),
            dispatch_timeout: config.dispatch_timeout(),
        }
    }
}

/// Removes dead subscriptions in the background.
#[derive(Clone)]
pub struct Pruner {
    registry: SubscriptionRegistry,
    tasks: Arc<Mutex<JoinSet<()>>>,
}

impl Pruner {
    pub fn new(registry: SubscriptionRegistry) -> Self {
        Self {
            registry,
            tasks: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    /// Queue removal of `endpoint` without waiting for it.
    pub fn schedule(&self, endpoint: String) {
        let registry = self.registry.clone();
        let Ok(mut tasks) = self.tasks.lock() else {
            tracing::error!("Prune task set poisoned, skipping prune");
            return;
        };
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            match registry.unsubscribe(&endpoint).await {
                Ok(()) => {
                    metrics::record_prune("removed");
                    tracing::info!(push_service = %endpoint_origin(&endpoint), "Pruned gone subscription");
                }
                Err(e) => {
                    metrics::record_prune("error");
                    tracing::warn!(
                        push_service = %endpoint_origin(&endpoint),
                        error = %e,
                        "Failed to prune gone subscription"
                    );
                }
            }
        });
    }

    /// Wait for queued removals, up to `timeout`. Returns how many were left unfinished.
    pub async fn drain(&self, timeout: Duration) -> usize {
        let mut tasks = match self.tasks.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(_) => return 0,
        };
        let deadline = tokio::time::Instant::now() + timeout;
        while let Ok(Some(_)) = tokio::time::timeout_at(deadline, tasks.join_next()).await {}
        let left = tasks.len();
        if left > 0 {
            tasks.abort_all();
        }
        left
    }
}

/// Delivers one notification to every active subscription.
#[derive(Clone)]
pub struct PushDispatcher {
    registry: SubscriptionRegistry,
    transport: Arc<dyn PushTransport>,
    presentation: Arc<Presentation>,
    limits: DispatchLimits,
    pruner: Pruner,
}

impl PushDispatcher {
    pub fn new(
        registry: SubscriptionRegistry,
        transport: Arc<dyn PushTransport>,
        presentation: Presentation,
        limits: DispatchLimits,
    ) -> Self {
        let pruner = Pruner::new(registry.clone());
        Self {
            registry,
            transport,
            presentation: Arc::new(presentation),
            limits,
            pruner,
        }
    }

    pub fn pruner(&self) -> &Pruner {
        &self.pruner
    }

    pub async fn dispatch(
        &self,
        payload: &NotificationPayload,
    ) -> Result<DispatchSummary, DispatchError> {
        if payload.title.trim().is_empty() {
            return Err(DispatchError::MissingTitle);
        }
        let started = Instant::now();

        let subscriptions: Vec<PushSubscription> =
            self.registry.list_active().try_collect().await?;
        let total = subscriptions.len();
        if total == 0 {
            tracing::debug!("No active subscriptions, nothing to dispatch");
            return Ok(DispatchSummary::default());
        }

        let outcomes = match serde_json::to_string(&DeliveredMessage::new(payload, &self.presentation)) {
            Ok(message) => self.fan_out(subscriptions, Arc::from(message)).await,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize notification");
                subscriptions
                    .into_iter()
                    .map(|s| outcome(s.endpoint, Err(DeliveryError::Encoding(e.to_string()))))
                    .collect()
            }
        };

        let mut sent = 0;
        for outcome in &outcomes {
            if outcome.success {
                sent += 1;
                metrics::record_delivery("sent");
            } else if outcome.gone {
                metrics::record_delivery("gone");
                self.pruner.schedule(outcome.endpoint.clone());
            } else {
                metrics::record_delivery("failed");
                tracing::debug!(
                    push_service = %endpoint_origin(&outcome.endpoint),
                    status = ?outcome.error_code,
                    error = outcome.error.as_deref().unwrap_or_default(),
                    "Delivery failed"
                );
            }
        }
        let summary = DispatchSummary {
            sent,
            failed: total - sent,
            total,
        };

        metrics::record_dispatch(started);
        tracing::info!(
            sent = summary.sent,
            failed = summary.failed,
            total = summary.total,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Dispatch finished"
        );
        Ok(summary)
    }

    async fn fan_out(
        &self,
        subscriptions: Vec<PushSubscription>,
        message: Arc<str>,
    ) -> Vec<DeliveryOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.limits.max_concurrency.max(1)));
        let attempt_timeout = self.limits.attempt_timeout;
        let total = subscriptions.len();

        let mut attempts = JoinSet::new();
        for subscription in subscriptions {
            let semaphore = semaphore.clone();
            let transport = self.transport.clone();
            let message = message.clone();
            attempts.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let result = match tokio::time::timeout(
                    attempt_timeout,
                    transport.deliver(&subscription, &message),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(DeliveryError::Timeout(attempt_timeout)),
                };
                outcome(subscription.endpoint, result)
            });
        }

        let deadline = tokio::time::Instant::now() + self.limits.dispatch_timeout;
        let mut outcomes = Vec::with_capacity(total);
        loop {
            match tokio::time::timeout_at(deadline, attempts.join_next()).await {
                Ok(Some(Ok(outcome))) => outcomes.push(outcome),
                Ok(Some(Err(e))) => {
                    tracing::error!(error = %e, "Delivery task failed");
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        pending = attempts.len(),
                        "Dispatch ceiling reached, abandoning stragglers"
                    );
                    attempts.abort_all();
                    break;
                }
            }
        }
        outcomes
    }
}

fn outcome(endpoint: String, result: Result<(), DeliveryError>) -> DeliveryOutcome {
    match result {
        Ok(()) => DeliveryOutcome {
            endpoint,
            success: true,
            error_code: None,
            gone: false,
            error: None,
        },
        Err(e) => DeliveryOutcome {
            endpoint,
            success: false,
            error_code: e.status(),
            gone: e.is_gone(),
            error: Some(e.to_string()),
        },
    }
}
