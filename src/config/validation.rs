//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, limits > 0)
//! - Check that addresses and URLs parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{GatewayConfig, LimitPolicy};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },

    #[error("push.dispatch_timeout_ms ({dispatch_ms}) must not be shorter than push.attempt_timeout_ms ({attempt_ms})")]
    DispatchShorterThanAttempt { dispatch_ms: u64, attempt_ms: u64 },

    #[error("listener.request_timeout_secs ({request_ms} ms) must cover a full dispatch ({required_ms} ms)")]
    RequestTimeoutTooShort { request_ms: u64, required_ms: u64 },

    #[error("{field} is not a valid address: {value}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field} is not a valid URL: {value}")]
    InvalidUrl { field: &'static str, value: String },

    #[error("{field} contains an empty path")]
    EmptyPath { field: &'static str },
}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    positive(&mut errors, "listener.request_timeout_secs", config.listener.request_timeout_secs);
    positive(&mut errors, "listener.max_body_size", config.listener.max_body_size as u64);

    let rate_limit = &config.rate_limit;
    policy(&mut errors, "rate_limit.api", &rate_limit.api);
    policy(&mut errors, "rate_limit.auth", &rate_limit.auth);
    positive(&mut errors, "rate_limit.store_timeout_ms", rate_limit.store_timeout_ms);
    positive(&mut errors, "rate_limit.purge_interval_secs", rate_limit.purge_interval_secs);
    if let Some(redis_url) = &rate_limit.redis_url {
        url_field(&mut errors, "rate_limit.redis_url", redis_url);
    }

    let push = &config.push;
    positive(&mut errors, "push.max_concurrency", push.max_concurrency as u64);
    positive(&mut errors, "push.attempt_timeout_ms", push.attempt_timeout_ms);
    positive(&mut errors, "push.dispatch_timeout_ms", push.dispatch_timeout_ms);
    if push.dispatch_timeout_ms < push.attempt_timeout_ms {
        errors.push(ValidationError::DispatchShorterThanAttempt {
            dispatch_ms: push.dispatch_timeout_ms,
            attempt_ms: push.attempt_timeout_ms,
        });
    }

    let remote = &config.remote;
    positive(&mut errors, "remote.timeout_ms", remote.timeout_ms);

    // `/push-send` lists subscriptions (a remote call when configured) and then
    // fans out; the request deadline must not cut that short.
    let list_ms = if remote.base_url.is_some() { remote.timeout_ms } else { 0 };
    let required_ms = push.dispatch_timeout_ms.saturating_add(list_ms);
    let request_ms = config.listener.request_timeout_secs.saturating_mul(1_000);
    if request_ms < required_ms {
        errors.push(ValidationError::RequestTimeoutTooShort { request_ms, required_ms });
    }
    if let Some(base_url) = &remote.base_url {
        url_field(&mut errors, "remote.base_url", base_url);
    }
    if remote.read_paths.keys().any(|path| path.trim().is_empty()) {
        errors.push(ValidationError::EmptyPath { field: "remote.read_paths" });
    }
    if remote.write_paths.keys().any(|path| path.trim().is_empty()) {
        errors.push(ValidationError::EmptyPath { field: "remote.write_paths" });
    }

    let observability = &config.observability;
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn positive(errors: &mut Vec<ValidationError>, field: &'static str, value: u64) {
    if value == 0 {
        errors.push(ValidationError::NotPositive { field });
    }
}

fn policy(errors: &mut Vec<ValidationError>, field: &'static str, policy: &LimitPolicy) {
    if policy.limit == 0 || policy.window_secs == 0 {
        errors.push(ValidationError::NotPositive { field });
    }
}

fn url_field(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if url::Url::parse(value).is_err() {
        errors.push(ValidationError::InvalidUrl {
            field,
            value: value.to_string(),
        });
    }
}
