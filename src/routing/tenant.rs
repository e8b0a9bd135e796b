//! Tenant resolution gate.

use async_trait::async_trait;
use axum::{body::Body, http::Request};

use crate::config::schema::TenancyConfig;
use crate::http::error::GatewayError;
use crate::observability::metrics;
use crate::pipeline::gate::{Gate, GateResult, Proceed};
use crate::pipeline::trace::trace_of;

const MAX_TENANT_LEN: usize = 64;

/// The tenant a request resolved to, stored as a request extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantId(pub String);

pub struct TenantGate {
    config: TenancyConfig,
}

impl TenantGate {
    pub fn new(config: TenancyConfig) -> Self {
        Self { config }
    }

    fn resolve(&self, req: &Request<Body>) -> Result<Option<String>, GatewayError> {
        let tenant = match req.headers().get(self.config.header.as_str()) {
            Some(value) => {
                let value = value
                    .to_str()
                    .map_err(|_| GatewayError::Tenant("tenant header is not ASCII".into()))?
                    .trim();
                Some(value.to_string())
            }
            None => self.config.default_tenant.clone(),
        };

        let Some(tenant) = tenant else {
            if self.config.required {
                return Err(GatewayError::Tenant("tenant is required".into()));
            }
            return Ok(None);
        };

        let well_formed = !tenant.is_empty()
            && tenant.len() <= MAX_TENANT_LEN
            && tenant
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !well_formed {
            return Err(GatewayError::Tenant("malformed tenant id".into()));
        }
        if !self.config.allowed.is_empty() && !self.config.allowed.contains(&tenant) {
            return Err(GatewayError::Tenant(format!("unknown tenant '{tenant}'")));
        }
        Ok(Some(tenant))
    }
}

#[async_trait]
impl Gate for TenantGate {
    fn name(&self) -> &'static str {
        "tenant"
    }

    async fn apply(&self, mut req: Request<Body>, next: Proceed<'_>) -> GateResult {
        let tenant = self.resolve(&req).inspect_err(|_| {
            metrics::record_gate_rejection(self.name());
        })?;

        if let Some(tenant) = tenant {
            if let Some(trace) = trace_of(&req) {
                trace.set_tenant(tenant.as_str());
            }
            req.extensions_mut().insert(TenantId(tenant));
        }
        next.run(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(required: bool, allowed: &[&str]) -> TenantGate {
        TenantGate::new(TenancyConfig {
            enabled: true,
            required,
            allowed: allowed.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        })
    }

    fn request(tenant: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder();
        if let Some(t) = tenant {
            builder = builder.header("x-tenant-id", t);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_resolution() {
        let g = gate(false, &[]);
        assert_eq!(g.resolve(&request(Some("acme"))).unwrap(), Some("acme".into()));
        assert_eq!(g.resolve(&request(None)).unwrap(), None);
        assert!(g.resolve(&request(Some("bad tenant!"))).is_err());
    }

    #[test]
    fn test_required_and_allowed() {
        let g = gate(true, &["acme"]);
        assert!(matches!(g.resolve(&request(None)), Err(GatewayError::Tenant(_))));
        assert!(matches!(g.resolve(&request(Some("globex"))), Err(GatewayError::Tenant(_))));
        assert!(g.resolve(&request(Some("acme"))).is_ok());
    }
}
