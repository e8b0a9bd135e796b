//! The gate contract.
//!
//! A gate sees the request before anything behind it. It either hands the
//! (possibly modified) request on via [`Proceed::run`], or halts the chain
//! by returning without calling it: `Err(GatewayError)` for a rejection
//! rendered by the pipeline, or `Ok(response)` for a response it built
//! itself. Gates may also post-process whatever `run` returns.

use async_trait::async_trait;
use axum::{body::Body, http::Request, response::Response};
use futures_util::future::BoxFuture;
use std::sync::Arc;

use crate::http::error::GatewayError;

pub type GateResult = Result<Response, GatewayError>;

#[async_trait]
pub trait Gate: Send + Sync {
    /// Short identifier used in logs and metrics.
    fn name(&self) -> &'static str;

    async fn apply(&self, req: Request<Body>, next: Proceed<'_>) -> GateResult;
}

/// What runs after the last gate: the secure dispatcher in production,
/// a stub in tests.
#[async_trait]
pub trait Terminal: Send + Sync {
    async fn dispatch(&self, req: Request<Body>) -> GateResult;
}

/// The remainder of the chain, handed to each gate.
#[derive(Clone, Copy)]
pub struct Proceed<'a> {
    gates: &'a [Arc<dyn Gate>],
    terminal: &'a dyn Terminal,
}

impl<'a> Proceed<'a> {
    pub fn new(gates: &'a [Arc<dyn Gate>], terminal: &'a dyn Terminal) -> Self {
        Self { gates, terminal }
    }

    pub fn run(self, req: Request<Body>) -> BoxFuture<'a, GateResult> {
        Box::pin(async move {
            match self.gates.split_first() {
                Some((gate, rest)) => {
                    tracing::trace!(gate = gate.name(), "Entering gate");
                    gate.apply(req, Proceed::new(rest, self.terminal)).await
                }
                None => self.terminal.dispatch(req).await,
            }
        })
    }
}
