//! Envelope encryption for request and response bodies.
//!
//! # Data Flow
//! ```text
//! Request body (envelope JSON)
//!     → envelope::decode (RSA-OAEP unwrap with server key, AES-256-CBC decrypt)
//!     → plaintext JSON handed to the handler
//!
//! Handler JSON
//!     → envelope::encode (session public key present → seal, else plaintext)
//!     → response body
//! ```
//!
//! # Design Decisions
//! - Decode is pure: it returns a new value and never touches the request
//! - Decode failures abort; encode falls back to plaintext only when no
//!   session key exists

pub mod envelope;
pub mod keys;

pub use envelope::{CodecError, Encoded, Envelope, EnvelopeCodec};
pub use keys::{parse_public_key, KeyError, ServerKeys};
