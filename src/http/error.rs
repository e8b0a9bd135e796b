//! Gateway error taxonomy and its HTTP rendering.
//!
//! Every rejection, whether from a gate, the codec or the authorizer,
//! ends up here and is rendered as
//!
//! ```text
//! { "error": { "code": "forbidden", "message": "...", "correlation_id": "..." } }
//! ```
//!
//! Server-side failures (5xx) never expose their cause to the client; the
//! cause is logged alongside the correlation id instead.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

use crate::authz::store::StoreError;
use crate::crypto::CodecError;
use crate::http::request::X_CORRELATION_ID;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("service is under maintenance")]
    Maintenance,

    #[error("rate limit exceeded")]
    RateLimited { retry_after_secs: u64 },

    #[error("client address {0} is not permitted")]
    IpBlocked(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid request signature: {0}")]
    InvalidSignature(String),

    #[error("CSRF token mismatch")]
    CsrfMismatch,

    #[error("tenant resolution failed: {0}")]
    Tenant(String),

    #[error("request decryption failed: {0}")]
    Decryption(#[source] CodecError),

    #[error("response encryption failed: {0}")]
    Encryption(#[source] CodecError),

    #[error("authentication required")]
    Unauthenticated,

    #[error("insufficient permissions")]
    Forbidden,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Maintenance => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::IpBlocked(_) => StatusCode::FORBIDDEN,
            GatewayError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            GatewayError::InvalidSignature(_) => StatusCode::UNAUTHORIZED,
            GatewayError::CsrfMismatch => StatusCode::FORBIDDEN,
            GatewayError::Tenant(_) => StatusCode::BAD_REQUEST,
            GatewayError::Decryption(_) | GatewayError::Encryption(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GatewayError::Unauthenticated => StatusCode::UNAUTHORIZED,
            GatewayError::Forbidden => StatusCode::FORBIDDEN,
            GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Store(_) | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Maintenance => "maintenance",
            GatewayError::RateLimited { .. } => "rate_limited",
            GatewayError::IpBlocked(_) => "ip_blocked",
            GatewayError::InvalidInput(_) => "invalid_input",
            GatewayError::InvalidSignature(_) => "invalid_signature",
            GatewayError::CsrfMismatch => "csrf_mismatch",
            GatewayError::Tenant(_) => "invalid_tenant",
            GatewayError::Decryption(_) => "decryption_failed",
            GatewayError::Encryption(_) => "encryption_failed",
            GatewayError::Unauthenticated => "unauthenticated",
            GatewayError::Forbidden => "forbidden",
            GatewayError::Store(_) => "store_unavailable",
            GatewayError::Timeout(_) => "timeout",
            GatewayError::Internal(_) => "internal",
        }
    }

    /// Message safe to show the caller.
    pub fn public_message(&self) -> String {
        match self {
            GatewayError::IpBlocked(_) => "client address is not permitted".to_string(),
            GatewayError::Decryption(_) => "request could not be processed".to_string(),
            GatewayError::Encryption(_) | GatewayError::Store(_) | GatewayError::Internal(_) => {
                "internal server error".to_string()
            }
            other => other.to_string(),
        }
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            status: self.status(),
            code: self.code(),
            message: self.public_message(),
            detail: self.to_string(),
            retry_after_secs: match self {
                GatewayError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
                _ => None,
            },
        }
    }

    /// Render with the request's correlation id in body and header.
    pub fn into_response_with(self, correlation_id: Option<&str>) -> Response {
        self.report().render(correlation_id)
    }
}

/// A rendered [`GatewayError`]. Travels as a response extension so errors
/// returned by application handlers can be restamped with the correlation
/// id and audited with their real cause.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    status: StatusCode,
    code: &'static str,
    message: String,
    detail: String,
    retry_after_secs: Option<u64>,
}

impl ErrorReport {
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// Full error text; never sent to the client.
    pub fn detail(&self) -> &str {
        &self.detail
    }

    pub fn render(&self, correlation_id: Option<&str>) -> Response {
        let body = json!({
            "error": {
                "code": self.code,
                "message": self.message,
                "correlation_id": correlation_id,
            }
        });

        let mut response = (self.status, Json(body)).into_response();
        let headers = response.headers_mut();
        if let Some(secs) = self.retry_after_secs {
            headers.insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        if let Some(value) = correlation_id.and_then(|id| HeaderValue::from_str(id).ok()) {
            headers.insert(X_CORRELATION_ID, value);
        }
        response.extensions_mut().insert(self.clone());
        response
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        self.into_response_with(None)
    }
}
