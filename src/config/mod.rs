//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → consumed once by GatewayServer::new
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads + validates
//!     → ReloadHandles::apply swaps the live pieces
//!
//! Maintenance flag:
//!     remote.rs CachedFlag → StaticFlag | HttpFlag, refreshed on TTL expiry
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - A reload that fails validation keeps the running configuration

pub mod loader;
pub mod remote;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use remote::{CachedFlag, FlagError, FlagSource, HttpFlag, StaticFlag};
pub use schema::{Environment, GatewayConfig};
pub use watcher::ConfigWatcher;
