//! HMAC-SHA256 request signatures.
//!
//! Clients sign `"{timestamp}.{METHOD}.{path_and_query}.{body}"` with the
//! shared secret and send the hex digest in `x-signature` together with
//! `x-signature-timestamp` (unix seconds). Only installed in production.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request},
};
use hmac::{digest::InvalidLength, Hmac, Mac};
use sha2::Sha256;

use crate::http::error::GatewayError;
use crate::observability::metrics;
use crate::pipeline::gate::{Gate, GateResult, Proceed};

type HmacSha256 = Hmac<Sha256>;

pub const X_SIGNATURE: &str = "x-signature";
pub const X_SIGNATURE_TIMESTAMP: &str = "x-signature-timestamp";

fn mac(
    secret: &[u8],
    timestamp: i64,
    method: &Method,
    path_and_query: &str,
    body: &[u8],
) -> Result<HmacSha256, InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(secret)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(method.as_str().as_bytes());
    mac.update(b".");
    mac.update(path_and_query.as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(mac)
}

/// Hex signature for a request, as a client would compute it.
pub fn sign(
    secret: &[u8],
    timestamp: i64,
    method: &Method,
    path_and_query: &str,
    body: &[u8],
) -> Result<String, InvalidLength> {
    let mac = mac(secret, timestamp, method, path_and_query, body)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Clock skew check on an untrusted timestamp; never overflows.
fn within_tolerance(now: i64, timestamp: i64, tolerance_secs: i64) -> bool {
    now.abs_diff(timestamp) <= tolerance_secs.unsigned_abs()
}

pub struct SignatureGate {
    secret: Vec<u8>,
    tolerance_secs: i64,
    max_body_size: usize,
}

impl SignatureGate {
    pub fn new(secret: impl Into<Vec<u8>>, tolerance_secs: i64, max_body_size: usize) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs,
            max_body_size,
        }
    }

    fn header<'r>(req: &'r Request<Body>, name: &str) -> Result<&'r str, String> {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| format!("missing {name} header"))
    }

    fn reject(&self, reason: &str) -> GatewayError {
        metrics::record_gate_rejection(self.name());
        GatewayError::InvalidSignature(reason.to_string())
    }
}

#[async_trait]
impl Gate for SignatureGate {
    fn name(&self) -> &'static str {
        "signature"
    }

    async fn apply(&self, req: Request<Body>, next: Proceed<'_>) -> GateResult {
        let signature = match Self::header(&req, X_SIGNATURE).map(hex::decode) {
            Ok(Ok(sig)) => sig,
            Ok(Err(_)) => return Err(self.reject("signature is not hex")),
            Err(missing) => return Err(self.reject(&missing)),
        };
        let timestamp: i64 = match Self::header(&req, X_SIGNATURE_TIMESTAMP).map(str::parse::<i64>) {
            Ok(Ok(ts)) => ts,
            Ok(Err(_)) => return Err(self.reject("timestamp is not an integer")),
            Err(missing) => return Err(self.reject(&missing)),
        };

        if !within_tolerance(chrono::Utc::now().timestamp(), timestamp, self.tolerance_secs) {
            return Err(self.reject("timestamp outside tolerance window"));
        }

        let (parts, body) = req.into_parts();
        let bytes = axum::body::to_bytes(body, self.max_body_size)
            .await
            .map_err(|e| GatewayError::InvalidInput(format!("unreadable body: {e}")))?;

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let mac = mac(&self.secret, timestamp, &parts.method, path_and_query, &bytes)
            .map_err(|e| GatewayError::Internal(e.to_string()))?;

        if mac.verify_slice(&signature).is_err() {
            tracing::warn!(method = %parts.method, path = %parts.uri.path(), "Signature mismatch");
            return Err(self.reject("signature mismatch"));
        }

        next.run(Request::from_parts(parts, Body::from(bytes))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::gate::Terminal;
    use axum::response::IntoResponse;

    #[test]
    fn test_sign_is_stable() {
        let a = sign(b"k", 1700000000, &Method::POST, "/echo?x=1", b"{}").unwrap();
        let b = sign(b"k", 1700000000, &Method::POST, "/echo?x=1", b"{}").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let other = sign(b"k", 1700000000, &Method::PUT, "/echo?x=1", b"{}").unwrap();
        assert_ne!(a, other);
    }

    #[test]
    fn test_tolerance_window() {
        let now = 1_700_000_000;
        assert!(within_tolerance(now, now - 300, 300));
        assert!(within_tolerance(now, now + 300, 300));
        assert!(!within_tolerance(now, now - 301, 300));
        assert!(!within_tolerance(now, i64::MIN, 300));
        assert!(!within_tolerance(now, i64::MAX, 300));
        assert!(!within_tolerance(i64::MIN, i64::MAX, 300));
    }

    struct Accept;

    #[async_trait]
    impl Terminal for Accept {
        async fn dispatch(&self, _req: Request<Body>) -> GateResult {
            Ok(axum::http::StatusCode::OK.into_response())
        }
    }

    #[tokio::test]
    async fn test_extreme_timestamp_is_rejected() {
        let gate = SignatureGate::new(b"k".to_vec(), 300, 1024);
        for ts in [i64::MIN, i64::MAX] {
            let sig = sign(b"k", ts, &Method::GET, "/health", b"").unwrap();
            let req = Request::builder()
                .uri("/health")
                .header(X_SIGNATURE, sig)
                .header(X_SIGNATURE_TIMESTAMP, ts.to_string())
                .body(Body::empty())
                .unwrap();

            let result = gate.apply(req, Proceed::new(&[], &Accept)).await;
            assert!(matches!(result, Err(GatewayError::InvalidSignature(_))));
        }
    }
}
