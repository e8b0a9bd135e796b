//! Session registry (consumed interface).
//!
//! The codec reads a session's public key; the dispatcher reads its
//! principal and records activity. Creating sessions is the caller's job.

pub mod cookie;
pub mod store;

pub use cookie::{session_cookie, SESSION_COOKIE};
pub use store::{MemorySessionStore, NewSession, Session, SessionStore};
