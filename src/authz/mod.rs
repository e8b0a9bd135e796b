//! Role-based authorization.
//!
//! # Data Flow
//! ```text
//! Operation table (built at startup)
//!     → interceptor.rs (empty set → allow, no principal → 401)
//!     → engine.rs (roles → role permissions → matching permission rows)
//!     → store.rs (collaborator lookups)
//! ```
//!
//! # Design Decisions
//! - Permissions are typed (ResourceType × ActionType), parsed at registration
//! - OR semantics across a required list
//! - Soft-deleted permission rows never grant access

pub mod engine;
pub mod interceptor;
pub mod model;
pub mod store;

pub use engine::Authorizer;
pub use interceptor::authorize;
pub use model::{ActionType, Permission, PermissionParseError, Principal, ResourceType, UserId};
pub use store::{MemoryRbacStore, StoreError};
