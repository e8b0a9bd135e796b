//! Rejects request targets carrying traversal or control sequences.

use async_trait::async_trait;
use axum::{body::Body, http::Request};

use crate::http::error::GatewayError;
use crate::observability::metrics;
use crate::pipeline::gate::{Gate, GateResult, Proceed};

pub struct SanitizeGate;

/// Reason the target is unacceptable, if it is.
pub fn inspect_target(path: &str, query: Option<&str>) -> Option<&'static str> {
    if path.split('/').any(|seg| seg == ".." || seg.eq_ignore_ascii_case("%2e%2e")) {
        return Some("path traversal");
    }
    for part in std::iter::once(path).chain(query) {
        let lower = part.to_ascii_lowercase();
        if lower.contains("%00") {
            return Some("encoded NUL");
        }
        if part.chars().any(|c| c.is_control()) {
            return Some("control character");
        }
    }
    None
}

#[async_trait]
impl Gate for SanitizeGate {
    fn name(&self) -> &'static str {
        "sanitize"
    }

    async fn apply(&self, req: Request<Body>, next: Proceed<'_>) -> GateResult {
        if let Some(reason) = inspect_target(req.uri().path(), req.uri().query()) {
            metrics::record_gate_rejection(self.name());
            return Err(GatewayError::InvalidInput(reason.to_string()));
        }
        next.run(req).await
    }
}
