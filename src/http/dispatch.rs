//! The terminal stage: resolve, decode, authorize, handle, encode.
//!
//! # Data Flow
//! ```text
//! Request (after all gates)
//!     → OperationTable::resolve            (404 if unknown)
//!     → session from `session_token` cookie, touched
//!     → EnvelopeCodec::decode              (Sealed operations only)
//!     → authorize(operation permissions, session principal)
//!     → application Router (oneshot)
//!     → EnvelopeCodec::encode              (2xx, sealing operations only;
//!                                           non-JSON fails if the session has a key)
//!     → Response
//! ```

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use crate::authz::{authorize, Authorizer};
use crate::crypto::EnvelopeCodec;
use crate::http::cookies::Cookies;
use crate::http::error::GatewayError;
use crate::observability::metrics;
use crate::pipeline::gate::{GateResult, Terminal};
use crate::pipeline::trace::trace_of;
use crate::routing::OperationTable;
use crate::session::{Session, SessionStore, SESSION_COOKIE};

pub struct SecureDispatcher {
    operations: Arc<OperationTable>,
    codec: EnvelopeCodec,
    sessions: Arc<dyn SessionStore>,
    authorizer: Arc<Authorizer>,
    app: Router,
    max_body_size: usize,
}

impl SecureDispatcher {
    pub fn new(
        operations: Arc<OperationTable>,
        codec: EnvelopeCodec,
        sessions: Arc<dyn SessionStore>,
        authorizer: Arc<Authorizer>,
        app: Router,
        max_body_size: usize,
    ) -> Self {
        Self {
            operations,
            codec,
            sessions,
            authorizer,
            app,
            max_body_size,
        }
    }

    async fn resolve_session(&self, token: Option<String>) -> Option<Session> {
        let token = token?;
        let session = match self.sessions.find_by_token(&token).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                tracing::debug!("Session cookie does not match any session");
                return None;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Session lookup failed, continuing anonymously");
                return None;
            }
        };

        if session.is_expired(chrono::Utc::now()) {
            tracing::info!(expires_at = %session.expires_at, "Request on expired session");
        }
        if let Err(e) = self.sessions.touch(&token).await {
            tracing::warn!(error = %e, "Failed to touch session");
        }
        Some(session)
    }

    async fn decode_body(&self, req: Request<Body>) -> Result<Request<Body>, GatewayError> {
        let (mut parts, body) = req.into_parts();
        let raw = axum::body::to_bytes(body, self.max_body_size)
            .await
            .map_err(|e| GatewayError::InvalidInput(format!("unreadable body: {e}")))?;

        let value = self.codec.decode(&raw).map_err(|e| {
            metrics::record_codec_failure("decode");
            GatewayError::Decryption(e)
        })?;

        let plain = serde_json::to_vec(&value).map_err(|e| GatewayError::Internal(e.to_string()))?;
        parts.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        parts.headers.remove(header::CONTENT_LENGTH);
        Ok(Request::from_parts(parts, Body::from(plain)))
    }

    async fn encode_body(
        &self,
        response: Response,
        session: Option<&Session>,
    ) -> Result<Response, GatewayError> {
        let (mut parts, body) = response.into_parts();
        let raw = axum::body::to_bytes(body, usize::MAX)
            .await
            .map_err(|e| GatewayError::Internal(format!("unreadable response body: {e}")))?;
        let value: Value = if raw.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&raw)
                .map_err(|e| GatewayError::Internal(format!("handler returned invalid JSON: {e}")))?
        };

        let encoded = self.codec.encode(value, session).map_err(|e| {
            metrics::record_codec_failure("encode");
            GatewayError::Encryption(e)
        })?;
        let bytes = encoded.to_json_bytes().map_err(GatewayError::Encryption)?;

        parts.headers.remove(header::CONTENT_LENGTH);
        Ok(Response::from_parts(parts, Body::from(bytes)))
    }
}

fn is_json(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"))
}

#[async_trait]
impl Terminal for SecureDispatcher {
    async fn dispatch(&self, req: Request<Body>) -> GateResult {
        let Some(operation) = self.operations.resolve(req.method(), req.uri().path()) else {
            return Ok((
                StatusCode::NOT_FOUND,
                axum::Json(json!({ "error": { "code": "not_found", "message": "no such operation" } })),
            )
                .into_response());
        };

        let token = req
            .extensions()
            .get::<Cookies>()
            .and_then(|c| c.get(SESSION_COOKIE))
            .map(str::to_owned);
        let session = self.resolve_session(token).await;
        let principal = session.as_ref().and_then(Session::principal);
        if let (Some(principal), Some(trace)) = (principal, trace_of(&req)) {
            trace.set_user_id(principal.user_id);
        }

        let mut req = if operation.envelope().decodes_request() {
            self.decode_body(req).await?
        } else {
            req
        };

        authorize(
            &self.authorizer,
            operation.id(),
            operation.required(),
            principal.as_ref(),
        )
        .await?;

        if let Some(principal) = principal {
            req.extensions_mut().insert(principal);
        }
        if let Some(session) = session.clone() {
            req.extensions_mut().insert(session);
        }

        let response = self
            .app
            .clone()
            .oneshot(req)
            .await
            .unwrap_or_else(|never| match never {});

        if !operation.envelope().encodes_response() || !response.status().is_success() {
            return Ok(response);
        }
        if is_json(&response) {
            return self.encode_body(response, session.as_ref()).await;
        }

        // Only a keyless session may receive a body that cannot be sealed.
        if session.as_ref().is_some_and(|s| s.public_key.is_some()) {
            metrics::record_codec_failure("encode");
            return Err(GatewayError::Internal(format!(
                "{} returned a non-JSON body on a sealed operation",
                operation.id()
            )));
        }
        Ok(response)
    }
}
