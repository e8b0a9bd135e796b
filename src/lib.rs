//! Secure request gateway library.
//!
//! Every request passes an ordered chain of gates, then a dispatcher that
//! opens sealed request envelopes, enforces role-based permissions, runs
//! the handler and seals the response for the caller's session key.

// Core subsystems
pub mod config;
pub mod http;
pub mod pipeline;
pub mod routing;

// Request security
pub mod authz;
pub mod crypto;
pub mod security;
pub mod session;

// Cross-cutting concerns
pub mod audit;
pub mod lifecycle;
pub mod observability;

// Demo application surface
pub mod api;

pub use config::GatewayConfig;
pub use http::{GatewayError, GatewayServer};
pub use lifecycle::Shutdown;
