//! Demo HTTP surface wired behind the pipeline.
//!
//! The dispatcher consults [`operations`] for permissions and envelope
//! handling; [`router`] holds the handlers themselves. Both must list the
//! same routes.

pub mod handlers;

use axum::{
    http::Method,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

use crate::config::Environment;
use crate::routing::OperationSpec;
use crate::session::SessionStore;

#[derive(Clone)]
pub struct ApiState {
    pub sessions: Arc<dyn SessionStore>,
    pub public_key_pem: Arc<str>,
    pub environment: Environment,
    pub csrf_cookie_name: Arc<str>,
    pub session_ttl: chrono::Duration,
}

pub fn operations() -> Vec<OperationSpec> {
    vec![
        OperationSpec::new(Method::GET, "/health"),
        OperationSpec::new(Method::GET, "/session/key"),
        OperationSpec::new(Method::POST, "/session/handshake"),
        OperationSpec::new(Method::POST, "/echo").sealed(),
        OperationSpec::new(Method::PUT, "/manuals/{id}")
            .requires("Manual.update")
            .sealed(),
    ]
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/session/key", get(handlers::server_key))
        .route("/session/handshake", post(handlers::handshake))
        .route("/echo", post(handlers::echo))
        .route("/manuals/{id}", put(handlers::update_manual))
        .with_state(state)
}
