//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_rejected_total` (counter): gate/auth rejections by reason
//! - `gateway_rate_limit_decisions_total` (counter): decisions by class, outcome
//! - `gateway_rate_limit_store_errors_total` (counter): fail-open events
//! - `push_dispatch_total` (counter): dispatch calls
//! - `push_delivery_total` (counter): delivery attempts by outcome
//! - `push_dispatch_duration_seconds` (histogram): dispatch latency
//! - `push_pruned_total` (counter): pruning results
//! - `push_subscriptions_total` (counter): registry writes by operation
//! - `remote_requests_total` (counter): remote data service calls
//!
//! # Design Decisions
//! - Recording is a no-op until `init_metrics` installs the exporter
//! - Labels are low-cardinality; endpoints and identities never become labels

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on its own listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_rejection(reason: &'static str) {
    counter!("gateway_requests_rejected_total", "reason" => reason).increment(1);
}

pub fn record_rate_limit_decision(class: &'static str, allowed: bool) {
    let outcome = if allowed { "allowed" } else { "denied" };
    counter!("gateway_rate_limit_decisions_total", "class" => class, "outcome" => outcome)
        .increment(1);
}

pub fn record_rate_limit_store_error() {
    counter!("gateway_rate_limit_store_errors_total").increment(1);
}

pub fn record_dispatch(started: Instant) {
    counter!("push_dispatch_total").increment(1);
    histogram!("push_dispatch_duration_seconds").record(started.elapsed().as_secs_f64());
}

pub fn record_delivery(outcome: &'static str) {
    counter!("push_delivery_total", "outcome" => outcome).increment(1);
}

pub fn record_prune(outcome: &'static str) {
    counter!("push_pruned_total", "outcome" => outcome).increment(1);
}

pub fn record_subscription_event(op: &'static str) {
    counter!("push_subscriptions_total", "op" => op).increment(1);
}

pub fn record_remote_request(kind: &'static str, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    counter!("remote_requests_total", "kind" => kind, "outcome" => outcome).increment(1);
}
