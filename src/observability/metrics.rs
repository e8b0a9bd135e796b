//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status
//! - `gateway_request_duration_seconds` (histogram): end-to-end latency
//! - `gateway_gate_rejections_total` (counter): short-circuits by gate
//! - `gateway_authz_decisions_total` (counter): allowed / denied
//! - `gateway_codec_failures_total` (counter): envelope failures by direction
//! - `gateway_audit_events_total` (counter): published / skipped / failed
//! - `gateway_flag_refreshes_total` (counter): ok / error
//!
//! Without an installed recorder every call here is a no-op.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics recorder"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];
    counter!("gateway_requests_total", &labels).increment(1);
    histogram!("gateway_request_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_gate_rejection(gate: &'static str) {
    counter!("gateway_gate_rejections_total", "gate" => gate).increment(1);
}

pub fn record_authz_decision(allowed: bool) {
    let outcome = if allowed { "allowed" } else { "denied" };
    counter!("gateway_authz_decisions_total", "decision" => outcome).increment(1);
}

/// `direction` is "decode" or "encode".
pub fn record_codec_failure(direction: &'static str) {
    counter!("gateway_codec_failures_total", "direction" => direction).increment(1);
}

pub fn record_audit_event(outcome: &'static str) {
    counter!("gateway_audit_events_total", "outcome" => outcome).increment(1);
}

pub fn record_flag_refresh(outcome: &'static str) {
    counter!("gateway_flag_refreshes_total", "outcome" => outcome).increment(1);
}
