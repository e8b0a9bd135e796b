//! Double-submit CSRF protection.
//!
//! State-changing requests must echo the `csrf_token` cookie in the
//! `x-csrf-token` header. The token is issued by the session handshake.

use async_trait::async_trait;
use axum::{body::Body, http::Request};
use rand::RngCore;
use subtle::ConstantTimeEq;

use crate::config::schema::{CsrfConfig, Environment};
use crate::http::cookies::Cookies;
use crate::http::error::GatewayError;
use crate::observability::metrics;
use crate::pipeline::gate::{Gate, GateResult, Proceed};

/// 32 random bytes, hex encoded.
pub fn issue_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Readable by scripts so the client can echo it.
pub fn csrf_cookie(name: &str, token: &str, environment: Environment) -> String {
    let mut cookie = format!("{name}={token}; Path=/; SameSite=Strict");
    if !environment.is_local_or_dev() {
        cookie.push_str("; Secure");
    }
    cookie
}

pub struct CsrfGate {
    config: CsrfConfig,
}

impl CsrfGate {
    pub fn new(config: CsrfConfig) -> Self {
        Self { config }
    }

    fn check(&self, req: &Request<Body>) -> Result<(), &'static str> {
        if req.method().is_safe() || self.config.exempt_paths.iter().any(|p| p == req.uri().path()) {
            return Ok(());
        }

        let cookie = req
            .extensions()
            .get::<Cookies>()
            .and_then(|c| c.get(&self.config.cookie_name))
            .ok_or("missing CSRF cookie")?;
        let header = req
            .headers()
            .get(self.config.header_name.as_str())
            .and_then(|v| v.to_str().ok())
            .ok_or("missing CSRF header")?;

        if cookie.is_empty() || !bool::from(cookie.as_bytes().ct_eq(header.as_bytes())) {
            return Err("CSRF token mismatch");
        }
        Ok(())
    }
}

#[async_trait]
impl Gate for CsrfGate {
    fn name(&self) -> &'static str {
        "csrf"
    }

    async fn apply(&self, req: Request<Body>, next: Proceed<'_>) -> GateResult {
        if let Err(reason) = self.check(&req) {
            tracing::warn!(method = %req.method(), path = %req.uri().path(), reason, "CSRF check failed");
            metrics::record_gate_rejection(self.name());
            return Err(GatewayError::CsrfMismatch);
        }
        next.run(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    fn request(method: Method, path: &str, cookie: Option<&str>, header: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(h) = header {
            builder = builder.header("x-csrf-token", h);
        }
        if let Some(c) = cookie {
            builder = builder.header("cookie", format!("csrf_token={c}"));
        }
        let mut req = builder.body(Body::empty()).unwrap();
        let cookies = Cookies::from_headers(req.headers());
        req.extensions_mut().insert(cookies);
        req
    }

    #[test]
    fn test_double_submit() {
        let gate = CsrfGate::new(CsrfConfig::default());

        assert!(gate.check(&request(Method::GET, "/health", None, None)).is_ok());
        assert!(gate.check(&request(Method::POST, "/session/handshake", None, None)).is_ok());
        assert!(gate.check(&request(Method::POST, "/echo", Some("t1"), Some("t1"))).is_ok());

        assert_eq!(
            gate.check(&request(Method::POST, "/echo", Some("t1"), Some("t2"))),
            Err("CSRF token mismatch")
        );
        assert_eq!(
            gate.check(&request(Method::POST, "/echo", None, Some("t1"))),
            Err("missing CSRF cookie")
        );
    }

    #[test]
    fn test_issue_token() {
        let a = issue_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, issue_token());
        assert!(csrf_cookie("csrf_token", &a, Environment::Production).ends_with("; Secure"));
    }
}
