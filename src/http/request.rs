//! Request identity: correlation ids and client addresses.

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{HeaderValue, Request},
};
use std::net::{IpAddr, SocketAddr};
use uuid::Uuid;

use crate::pipeline::gate::{Gate, GateResult, Proceed};
use crate::pipeline::trace::trace_of;

pub const X_CORRELATION_ID: &str = "x-correlation-id";

const MAX_CORRELATION_ID_LEN: usize = 128;

/// Identifier tying together the logs, audit record and response of one
/// request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationId(String);

impl CorrelationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Accept a caller-supplied id if it is short and plain.
    pub fn from_header(value: &HeaderValue) -> Option<Self> {
        let s = value.to_str().ok()?;
        let valid = !s.is_empty()
            && s.len() <= MAX_CORRELATION_ID_LEN
            && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        valid.then(|| Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reuses a valid inbound `x-correlation-id` or mints one, and echoes it on
/// the response.
pub struct CorrelationGate;

#[async_trait]
impl Gate for CorrelationGate {
    fn name(&self) -> &'static str {
        "correlation"
    }

    async fn apply(&self, mut req: Request<Body>, next: Proceed<'_>) -> GateResult {
        let id = req
            .headers()
            .get(X_CORRELATION_ID)
            .and_then(CorrelationId::from_header)
            .unwrap_or_else(CorrelationId::generate);

        if let Some(trace) = trace_of(&req) {
            trace.set_correlation_id(id.as_str());
        }
        let header = HeaderValue::from_str(id.as_str()).ok();
        if let Some(value) = header.clone() {
            req.headers_mut().insert(X_CORRELATION_ID, value);
        }
        req.extensions_mut().insert(id);

        let mut response = next.run(req).await?;
        if let Some(value) = header {
            response.headers_mut().insert(X_CORRELATION_ID, value);
        }
        Ok(response)
    }
}

/// Resolved client address, inserted by the pipeline before any gate runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientAddr(pub Option<IpAddr>);

/// First `X-Forwarded-For` hop when trusted, else the socket peer.
pub fn resolve_client_ip<B>(req: &Request<B>, trust_forwarded_for: bool) -> Option<IpAddr> {
    if trust_forwarded_for {
        let forwarded = req
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|first| first.trim().parse::<IpAddr>().ok());
        if forwarded.is_some() {
            return forwarded;
        }
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correlation_id_validation() {
        let ok = HeaderValue::from_static("req_42-abc");
        assert_eq!(CorrelationId::from_header(&ok).unwrap().as_str(), "req_42-abc");

        let spaced = HeaderValue::from_static("has space");
        assert!(CorrelationId::from_header(&spaced).is_none());

        let long = HeaderValue::from_str(&"a".repeat(129)).unwrap();
        assert!(CorrelationId::from_header(&long).is_none());
    }

    #[test]
    fn test_resolve_client_ip() {
        let mut req = Request::builder()
            .header("x-forwarded-for", "203.0.113.9, 10.0.0.1")
            .body(())
            .unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));

        assert_eq!(
            resolve_client_ip(&req, true),
            Some("203.0.113.9".parse().unwrap())
        );
        assert_eq!(
            resolve_client_ip(&req, false),
            Some("127.0.0.1".parse().unwrap())
        );
    }
}
