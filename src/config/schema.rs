//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the secure gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Deployment environment; drives cookie and signature behaviour.
    pub environment: Environment,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Maintenance-mode switch.
    pub maintenance: MaintenanceConfig,

    /// Rate limiting configuration.
    pub rate_limit: RateLimitConfig,

    /// Client address allow/deny lists.
    pub ip_filter: IpFilterConfig,

    /// Request hardening.
    pub security: SecurityConfig,

    /// HMAC request signing (production only).
    pub signature: SignatureConfig,

    /// Double-submit CSRF protection.
    pub csrf: CsrfConfig,

    /// Tenant resolution.
    pub tenancy: TenancyConfig,

    /// Envelope encryption key material.
    pub crypto: CryptoConfig,

    /// Audit record publication.
    pub audit: AuditConfig,

    /// Seed data for the in-memory role store.
    pub rbac: RbacSeedConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Local,
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn is_local_or_dev(&self) -> bool {
        matches!(self, Environment::Local | Environment::Development)
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Maintenance mode configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Static switch, used when no remote URL is configured.
    pub enabled: bool,

    /// Remote flag endpoint returning `{"enabled": bool}`.
    pub remote_url: Option<String>,

    /// How long a fetched value stays fresh.
    pub refresh_secs: u64,

    /// Paths served even during maintenance.
    pub bypass_paths: Vec<String>,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            remote_url: None,
            refresh_secs: 30,
            bypass_paths: vec!["/health".to_string()],
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Sustained requests per second per client address.
    pub requests_per_second: u32,

    /// Burst capacity.
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_second: 50,
            burst_size: 100,
        }
    }
}

/// Client IP filtering. Entries are single addresses or CIDR blocks.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct IpFilterConfig {
    /// When non-empty, only matching clients are admitted.
    pub allow: Vec<String>,

    /// Always rejected, even if also allowed.
    pub deny: Vec<String>,
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum body size in bytes.
    pub max_body_size: usize,

    /// Take the client address from `X-Forwarded-For`.
    pub trust_forwarded_for: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
            trust_forwarded_for: false,
        }
    }
}

/// HMAC-SHA256 request signature verification.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SignatureConfig {
    /// Shared secret. Required in production.
    pub secret: Option<String>,

    /// Allowed clock skew for `x-signature-timestamp`.
    pub tolerance_secs: i64,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            secret: None,
            tolerance_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CsrfConfig {
    pub enabled: bool,
    pub cookie_name: String,
    pub header_name: String,
    /// Paths that may be called before a CSRF cookie exists.
    pub exempt_paths: Vec<String>,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cookie_name: "csrf_token".to_string(),
            header_name: "x-csrf-token".to_string(),
            exempt_paths: vec!["/session/handshake".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TenancyConfig {
    pub enabled: bool,

    /// Header carrying the tenant id.
    pub header: String,

    /// Used when the header is absent.
    pub default_tenant: Option<String>,

    /// Reject requests that resolve to no tenant.
    pub required: bool,

    /// Known tenants. Empty admits any well-formed id.
    pub allowed: Vec<String>,
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            header: "x-tenant-id".to_string(),
            default_tenant: None,
            required: false,
            allowed: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// PEM file holding the server private key (PKCS#8 or PKCS#1).
    pub private_key_path: Option<String>,

    /// Size of the ephemeral key generated when no key file is set.
    /// Not allowed in production.
    pub ephemeral_key_bits: usize,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            private_key_path: None,
            ephemeral_key_bits: 2048,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    pub enabled: bool,
    pub topic: String,
    /// Budget for the initial broker connection.
    pub connect_timeout_ms: u64,
    /// How long a single record waits for the broker to become ready.
    pub ready_timeout_ms: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            topic: "gateway.audit".to_string(),
            connect_timeout_ms: 5_000,
            ready_timeout_ms: 1_000,
        }
    }
}

/// Roles, their permissions and members for the in-memory store.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RbacSeedConfig {
    pub roles: Vec<RoleSeed>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoleSeed {
    pub name: String,
    /// `Resource.action` declarations.
    #[serde(default)]
    pub permissions: Vec<String>,
    /// User ids holding this role.
    #[serde(default)]
    pub users: Vec<i64>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
