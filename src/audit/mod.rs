//! Audit trail for every request leaving the pipeline.
//!
//! # Data Flow
//! ```text
//! Pipeline (response final)
//!     → AuditRecord::success | failure
//!     → AuditEmitter::emit (spawned, never awaited by the request)
//!     → wait for broker readiness (bounded)
//!     → AuditBroker::publish(topic, camelCase JSON)
//! ```
//!
//! # Design Decisions
//! - Broker errors stay inside the emitter; they are logged and counted
//! - No retries and no buffering of records while the broker is down

pub mod broker;
pub mod emitter;
pub mod record;

pub use broker::{AuditBroker, BrokerConnector, BrokerError, LogBroker, LogConnector, NullBroker};
pub use emitter::{AuditEmitter, PublishOutcome};
pub use record::{AuditRecord, AuditStatus};
