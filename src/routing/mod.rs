//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     OperationSpec[] (method, path, "Resource.action" declarations, envelope mode)
//!     → router.rs (parse permissions, compile templates, sort by specificity)
//!     → OperationTable (immutable)
//!
//! Per request:
//!     tenant.rs (TenantGate) → TenantId extension
//!     dispatcher → OperationTable::resolve(method, path) → Operation | None
//! ```
//!
//! # Design Decisions
//! - Permission metadata is data, registered next to the route
//! - Deterministic: same input always resolves to the same operation

pub mod matcher;
pub mod router;
pub mod tenant;

pub use router::{EnvelopeMode, Operation, OperationSpec, OperationTable, RegistrationError};
pub use tenant::{TenantGate, TenantId};
