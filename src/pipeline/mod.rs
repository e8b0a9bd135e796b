//! Ordered, short-circuiting request pipeline.
//!
//! # Data Flow
//! ```text
//! Request
//!     → orchestrator.rs (client address, RequestTrace, start timer)
//!     → gate 1 → gate 2 → ... → gate n      (any gate may halt)
//!     → Terminal::dispatch                  (secure dispatcher)
//!     ← Result<Response, GatewayError>
//!     → render error with correlation id
//!     → metrics + AuditEmitter::emit (not awaited)
//!     → Response
//! ```
//!
//! # Design Decisions
//! - Gate order is fixed at startup; gates run strictly one after another
//! - A gate halts simply by not calling `Proceed::run`
//! - Errors are rendered in one place so every rejection looks the same

pub mod gate;
pub mod orchestrator;
pub mod trace;

pub use gate::{Gate, GateResult, Proceed, Terminal};
pub use orchestrator::{serve, Pipeline};
pub use trace::RequestTrace;
