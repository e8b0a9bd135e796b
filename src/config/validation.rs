//! Configuration validation.
//!
//! Semantic checks that serde cannot express. Every problem is reported,
//! not just the first.

use std::net::SocketAddr;
use thiserror::Error;

use crate::authz::model::Permission;
use crate::config::schema::GatewayConfig;
use crate::security::ip_filter::IpRule;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if config.rate_limit.enabled {
        if config.rate_limit.requests_per_second == 0 {
            errors.push(ValidationError::new(
                "rate_limit.requests_per_second",
                "must be greater than 0",
            ));
        }
        if config.rate_limit.burst_size == 0 {
            errors.push(ValidationError::new("rate_limit.burst_size", "must be greater than 0"));
        }
    }

    for (list, entries) in [("allow", &config.ip_filter.allow), ("deny", &config.ip_filter.deny)] {
        for entry in entries {
            if let Err(e) = entry.parse::<IpRule>() {
                errors.push(ValidationError::new(format!("ip_filter.{list}"), e.to_string()));
            }
        }
    }

    if let Some(raw) = &config.maintenance.remote_url {
        match url::Url::parse(raw) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => {}
            Ok(u) => errors.push(ValidationError::new(
                "maintenance.remote_url",
                format!("unsupported scheme '{}'", u.scheme()),
            )),
            Err(e) => errors.push(ValidationError::new("maintenance.remote_url", e.to_string())),
        }
    }
    if config.maintenance.refresh_secs == 0 {
        errors.push(ValidationError::new("maintenance.refresh_secs", "must be greater than 0"));
    }

    if config.security.max_body_size == 0 {
        errors.push(ValidationError::new("security.max_body_size", "must be greater than 0"));
    }

    if config.environment.is_production() {
        let has_secret = config
            .signature
            .secret
            .as_deref()
            .is_some_and(|s| !s.is_empty());
        if !has_secret {
            errors.push(ValidationError::new(
                "signature.secret",
                "required in production",
            ));
        }
        if config.crypto.private_key_path.is_none() {
            errors.push(ValidationError::new(
                "crypto.private_key_path",
                "ephemeral keys are not allowed in production",
            ));
        }
    }
    if config.signature.tolerance_secs <= 0 {
        errors.push(ValidationError::new("signature.tolerance_secs", "must be greater than 0"));
    }

    if config.csrf.enabled
        && (config.csrf.cookie_name.is_empty() || config.csrf.header_name.is_empty())
    {
        errors.push(ValidationError::new("csrf", "cookie_name and header_name must be set"));
    }

    if config.tenancy.enabled && config.tenancy.header.is_empty() {
        errors.push(ValidationError::new("tenancy.header", "must be set when tenancy is enabled"));
    }

    if config.crypto.private_key_path.is_none() && config.crypto.ephemeral_key_bits < 1024 {
        errors.push(ValidationError::new(
            "crypto.ephemeral_key_bits",
            "must be at least 1024",
        ));
    }

    if config.audit.enabled && config.audit.topic.is_empty() {
        errors.push(ValidationError::new("audit.topic", "must be set when audit is enabled"));
    }

    for role in &config.rbac.roles {
        if role.name.is_empty() {
            errors.push(ValidationError::new("rbac.roles", "role name must not be empty"));
        }
        for name in &role.permissions {
            if let Err(e) = name.parse::<Permission>() {
                errors.push(ValidationError::new(
                    format!("rbac.roles[{}].permissions", role.name),
                    e.to_string(),
                ));
            }
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "not a socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{Environment, RoleSeed};

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&GatewayConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.ip_filter.deny = vec!["10.0.0.0/33".into()];
        config.maintenance.remote_url = Some("ftp://flags.internal".into());
        config.rbac.roles.push(RoleSeed {
            name: "Editor".into(),
            permissions: vec!["Manual.fly".into()],
            users: vec![],
        });

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "ip_filter.deny",
                "maintenance.remote_url",
                "rbac.roles[Editor].permissions",
            ]
        );
    }

    #[test]
    fn test_production_requirements() {
        let mut config = GatewayConfig::default();
        config.environment = Environment::Production;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "signature.secret"));
        assert!(errors.iter().any(|e| e.field == "crypto.private_key_path"));

        config.signature.secret = Some("k".into());
        config.crypto.private_key_path = Some("/etc/gateway/key.pem".into());
        assert_eq!(validate_config(&config), Ok(()));
    }
}
