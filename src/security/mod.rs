//! Security gates.
//!
//! # Data Flow
//! ```text
//! Incoming request (gate order):
//!     → maintenance.rs (503 while the maintenance flag is on)
//!     → rate_limit.rs (token bucket per client address)
//!     → ip_filter.rs (allow/deny CIDR rules, hot-swappable)
//!     → [correlation id, http::request]
//!     → sanitize.rs (traversal / NUL / control characters)
//!     → [cookies, http::cookies]
//!     → signature.rs (HMAC-SHA256, production only)
//!     → csrf.rs (double-submit token)
//!     → [tenant, routing::tenant]
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - No trust in client input; `X-Forwarded-For` only when configured
//! - Secrets compared in constant time

pub mod csrf;
pub mod ip_filter;
pub mod maintenance;
pub mod rate_limit;
pub mod sanitize;
pub mod signature;

pub use csrf::CsrfGate;
pub use ip_filter::{IpFilterGate, IpRule, IpRules};
pub use maintenance::MaintenanceGate;
pub use rate_limit::RateLimitGate;
pub use sanitize::SanitizeGate;
pub use signature::SignatureGate;
