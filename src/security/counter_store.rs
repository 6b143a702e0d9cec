//! Shared sliding-window counters.
//!
//! # Responsibilities
//! - Record admitted events per `(class, identifier)` key
//! - Decide admission and record in ONE atomic step against the store
//!
//! # Design Decisions
//! - The trait is the only thing the limiter sees; memory for tests and
//!   single instances, Redis for shared deployments
//! - Memory counters are purged by a background task bound to shutdown
//! - Redis keeps one sorted set per key (score = event time in millis) and
//!   runs trim + count + conditional add inside a Lua script
//! - The Redis connection is opened on first use and reconnects on its own,
//!   so an outage at boot or later only degrades the limiter while it lasts
//! - Denied requests are never recorded

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use thiserror::Error;
use tokio::sync::{broadcast, OnceCell};
use tokio::task::JoinHandle;
use tokio::time;

use crate::security::rate_limit::now_epoch_millis;

/// Window state right after one admission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    /// Whether the event was admitted (and recorded).
    pub allowed: bool,
    /// Events in the window after the decision.
    pub count: u32,
    /// Timestamp of the oldest event still in the window, or `now` when empty.
    pub oldest_ms: i64,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("counter store error: {0}")]
    Backend(String),

    #[error("counter store timed out after {0:?}")]
    Timeout(Duration),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Atomic increment-with-window capability.
#[async_trait]
pub trait CounterStore: Send + Sync + 'static {
    async fn hit(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now_ms: i64,
    ) -> Result<WindowState, StoreError>;
}

/// In-process counters. The per-key entry lock makes each hit atomic.
#[derive(Clone, Default)]
pub struct MemoryCounterStore {
    windows: Arc<DashMap<String, VecDeque<i64>>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop keys whose events have all expired.
    pub fn purge_expired(&self, window: Duration, now_ms: i64) {
        let cutoff = now_ms - window.as_millis() as i64;
        self.windows
            .retain(|_, events| events.back().is_some_and(|&t| t > cutoff));
    }

    pub fn key_count(&self) -> usize {
        self.windows.len()
    }

    /// Purge keys idle for longer than `window` every `interval` until shutdown.
    pub fn spawn_purge_task(
        &self,
        window: Duration,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let before = store.key_count();
                        store.purge_expired(window, now_epoch_millis());
                        tracing::debug!(
                            purged = before.saturating_sub(store.key_count()),
                            remaining = store.key_count(),
                            "Purged idle rate limit keys"
                        );
                    }
                    _ = shutdown.recv() => {
                        tracing::debug!("Rate limit purge task stopped");
                        break;
                    }
                }
            }
        })
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn hit(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now_ms: i64,
    ) -> Result<WindowState, StoreError> {
        let cutoff = now_ms - window.as_millis() as i64;
        let mut events = self.windows.entry(key.to_string()).or_default();

        while events.front().is_some_and(|&t| t <= cutoff) {
            events.pop_front();
        }

        let allowed = (events.len() as u64) < u64::from(limit);
        if allowed {
            events.push_back(now_ms);
        }

        Ok(WindowState {
            allowed,
            count: events.len() as u32,
            oldest_ms: events.front().copied().unwrap_or(now_ms),
        })
    }
}

const SLIDING_WINDOW_SCRIPT: &str = r"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window)
local count = redis.call('ZCARD', key)
local allowed = 0
if count < limit then
    redis.call('ZADD', key, now, ARGV[4])
    count = count + 1
    allowed = 1
end
redis.call('PEXPIRE', key, window)
local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
local oldest_ms = now
if oldest[2] then
    oldest_ms = tonumber(oldest[2])
end
return {allowed, count, oldest_ms}
";

/// Counters shared across gateway instances through Redis.
#[derive(Clone)]
pub struct RedisCounterStore {
    client: redis::Client,
    conn: Arc<OnceCell<ConnectionManager>>,
    script: Arc<redis::Script>,
    timeout: Duration,
}

impl RedisCounterStore {
    /// Prepare a store for `url` without connecting. Every round trip,
    /// including the first connect, is bounded by `timeout`.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, StoreError> {
        Ok(Self {
            client: redis::Client::open(url)?,
            conn: Arc::new(OnceCell::new()),
            script: Arc::new(redis::Script::new(SLIDING_WINDOW_SCRIPT)),
            timeout,
        })
    }

    /// Open the connection now. A failure is retried on the next hit.
    pub async fn connect(&self) -> Result<(), StoreError> {
        self.connection().await.map(|_| ())
    }

    async fn connection(&self) -> Result<ConnectionManager, StoreError> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                let manager = time::timeout(self.timeout, ConnectionManager::new(self.client.clone()))
                    .await
                    .map_err(|_| StoreError::Timeout(self.timeout))??;
                tracing::info!("Rate limit store connected");
                Ok::<_, StoreError>(manager)
            })
            .await?;
        Ok(conn.clone())
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn hit(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now_ms: i64,
    ) -> Result<WindowState, StoreError> {
        let mut conn = self.connection().await?;
        // Two hits in the same millisecond must stay distinct set members.
        let member = format!("{now_ms}-{}", uuid::Uuid::new_v4());
        let mut invocation = self.script.key(key);
        invocation
            .arg(now_ms)
            .arg(window.as_millis() as u64)
            .arg(limit)
            .arg(member);

        let reply: Vec<i64> = time::timeout(self.timeout, invocation.invoke_async(&mut conn))
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))??;

        match reply.as_slice() {
            [allowed, count, oldest_ms] => Ok(WindowState {
                allowed: *allowed == 1,
                count: (*count).max(0) as u32,
                oldest_ms: *oldest_ms,
            }),
            other => Err(StoreError::Backend(format!(
                "unexpected script reply with {} values",
                other.len()
            ))),
        }
    }
}
