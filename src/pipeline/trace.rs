//! Per-request facts collected while the chain runs.
//!
//! Gates that learn something the audit record needs (correlation id,
//! principal, tenant) write it here. The orchestrator keeps its own `Arc`
//! so the values survive even when a gate consumes the request.

use std::sync::{Arc, OnceLock};

use crate::authz::model::UserId;

#[derive(Debug, Default)]
pub struct RequestTrace {
    correlation_id: OnceLock<String>,
    user_id: OnceLock<UserId>,
    tenant: OnceLock<String>,
}

impl RequestTrace {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// First write wins.
    pub fn set_correlation_id(&self, id: impl Into<String>) {
        let _ = self.correlation_id.set(id.into());
    }

    pub fn set_user_id(&self, user_id: UserId) {
        let _ = self.user_id.set(user_id);
    }

    pub fn set_tenant(&self, tenant: impl Into<String>) {
        let _ = self.tenant.set(tenant.into());
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.get().map(String::as_str)
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id.get().copied()
    }

    pub fn tenant(&self) -> Option<&str> {
        self.tenant.get().map(String::as_str)
    }
}

/// Read the trace a request carries, if any.
pub fn trace_of<B>(req: &axum::http::Request<B>) -> Option<&Arc<RequestTrace>> {
    req.extensions().get::<Arc<RequestTrace>>()
}
