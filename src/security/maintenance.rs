//! Maintenance-mode gate.

use async_trait::async_trait;
use axum::{body::Body, http::Request};
use std::sync::Arc;

use crate::config::remote::CachedFlag;
use crate::http::error::GatewayError;
use crate::observability::metrics;
use crate::pipeline::gate::{Gate, GateResult, Proceed};

/// Rejects everything with 503 while the maintenance flag is on, except
/// the configured bypass paths.
pub struct MaintenanceGate {
    flag: Arc<CachedFlag>,
    bypass_paths: Vec<String>,
}

impl MaintenanceGate {
    pub fn new(flag: Arc<CachedFlag>, bypass_paths: Vec<String>) -> Self {
        Self { flag, bypass_paths }
    }
}

#[async_trait]
impl Gate for MaintenanceGate {
    fn name(&self) -> &'static str {
        "maintenance"
    }

    async fn apply(&self, req: Request<Body>, next: Proceed<'_>) -> GateResult {
        let path = req.uri().path();
        if self.bypass_paths.iter().any(|p| p == path) {
            return next.run(req).await;
        }

        if self.flag.get().await {
            metrics::record_gate_rejection(self.name());
            return Err(GatewayError::Maintenance);
        }
        next.run(req).await
    }
}
