//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, tower layers)
//!     → pipeline (gates, including request.rs and cookies.rs)
//!     → dispatch.rs (decode, authorize, handle, encode)
//!     → error.rs (uniform JSON errors with correlation id)
//!     → Send to client
//! ```

pub mod cookies;
pub mod dispatch;
pub mod error;
pub mod request;
pub mod server;

pub use error::{ErrorReport, GatewayError};
pub use request::{ClientAddr, CorrelationId, X_CORRELATION_ID};
pub use server::{Collaborators, GatewayServer, ReloadHandles, StartupError};
