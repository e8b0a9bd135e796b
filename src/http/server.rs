//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the operation table, codec and dispatcher
//! - Assemble the gate chain in its fixed order
//! - Wire up tower middleware (tracing only; limits and timeouts live
//!   inside the pipeline so rejections are ordered and audited)
//! - Serve with graceful shutdown
//! - Hand out handles for live config reloads

use arc_swap::ArcSwap;
use axum::{extract::DefaultBodyLimit, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::api::{self, ApiState};
use crate::audit::{AuditEmitter, BrokerConnector};
use crate::authz::Authorizer;
use crate::config::remote::{CachedFlag, FlagError, FlagSource, HttpFlag, StaticFlag};
use crate::config::schema::GatewayConfig;
use crate::crypto::{EnvelopeCodec, ServerKeys};
use crate::http::cookies::CookieGate;
use crate::http::dispatch::SecureDispatcher;
use crate::http::request::CorrelationGate;
use crate::lifecycle::shutdown;
use crate::pipeline::{serve, Gate, Pipeline};
use crate::routing::{OperationTable, RegistrationError, TenantGate};
use crate::security::ip_filter::{IpRuleError, IpRules};
use crate::security::{
    CsrfGate, IpFilterGate, MaintenanceGate, RateLimitGate, SanitizeGate, SignatureGate,
};
use crate::session::SessionStore;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    IpRules(#[from] IpRuleError),

    #[error("maintenance flag: {0}")]
    Flag(#[from] FlagError),

    #[error("invalid maintenance URL: {0}")]
    FlagUrl(#[from] url::ParseError),
}

/// External collaborators the gateway consumes.
pub struct Collaborators {
    pub sessions: Arc<dyn SessionStore>,
    pub authorizer: Arc<Authorizer>,
    pub audit: Arc<dyn BrokerConnector>,
}

/// Pieces of running state a config reload may replace.
#[derive(Clone)]
pub struct ReloadHandles {
    ip_rules: Arc<ArcSwap<IpRules>>,
    maintenance: Arc<StaticFlag>,
    maintenance_cache: Arc<CachedFlag>,
}

impl ReloadHandles {
    /// Apply the live-reloadable parts of `config`.
    pub fn apply(&self, config: &GatewayConfig) {
        match IpRules::from_config(&config.ip_filter) {
            Ok(rules) => {
                self.ip_rules.store(Arc::new(rules));
                tracing::info!("IP rules reloaded");
            }
            Err(e) => tracing::error!(error = %e, "Keeping previous IP rules"),
        }
        self.maintenance.set(config.maintenance.enabled);
        self.maintenance_cache.invalidate();
        tracing::info!(maintenance = config.maintenance.enabled, "Maintenance switch reloaded");
    }
}

pub struct GatewayServer {
    router: Router,
    pipeline: Arc<Pipeline>,
    reload: ReloadHandles,
}

impl GatewayServer {
    /// Must be called inside a tokio runtime; the audit connection starts
    /// immediately.
    pub fn new(
        config: GatewayConfig,
        keys: ServerKeys,
        collaborators: Collaborators,
    ) -> Result<Self, StartupError> {
        let keys = Arc::new(keys);
        let operations = Arc::new(OperationTable::build(api::operations())?);
        tracing::info!(operations = operations.len(), "Operation table built");

        let app = api::router(ApiState {
            sessions: collaborators.sessions.clone(),
            public_key_pem: Arc::from(keys.public_key_pem()),
            environment: config.environment,
            csrf_cookie_name: Arc::from(config.csrf.cookie_name.as_str()),
            session_ttl: chrono::Duration::seconds(crate::session::cookie::SESSION_MAX_AGE_SECS),
        })
        .layer(DefaultBodyLimit::max(config.security.max_body_size));

        let dispatcher = SecureDispatcher::new(
            operations,
            EnvelopeCodec::new(keys),
            collaborators.sessions,
            collaborators.authorizer,
            app,
            config.security.max_body_size,
        );

        let maintenance = Arc::new(StaticFlag::new(config.maintenance.enabled));
        let source: Arc<dyn FlagSource> = match &config.maintenance.remote_url {
            Some(raw) => Arc::new(HttpFlag::new(raw.parse()?, Duration::from_secs(5))?),
            None => maintenance.clone(),
        };
        let maintenance_cache = Arc::new(CachedFlag::new(
            source,
            Duration::from_secs(config.maintenance.refresh_secs),
        ));
        let ip_rules = Arc::new(ArcSwap::from_pointee(IpRules::from_config(&config.ip_filter)?));

        let reload = ReloadHandles {
            ip_rules: ip_rules.clone(),
            maintenance,
            maintenance_cache: maintenance_cache.clone(),
        };

        let gates = build_gates(&config, maintenance_cache, ip_rules);
        let audit = AuditEmitter::start(collaborators.audit, &config.audit);
        let pipeline = Arc::new(
            Pipeline::new(
                gates,
                Arc::new(dispatcher),
                audit,
                config.security.trust_forwarded_for,
            )
            .with_timeout(Duration::from_secs(config.timeouts.request_secs)),
        );
        tracing::info!(gates = ?pipeline.gate_names(), "Pipeline assembled");

        let router = Self::build_router(pipeline.clone());
        Ok(Self {
            router,
            pipeline,
            reload,
        })
    }

    /// Every request, whatever its size or route, goes through the pipeline.
    fn build_router(pipeline: Arc<Pipeline>) -> Router {
        Router::new()
            .fallback(serve)
            .with_state(pipeline)
            .layer(TraceLayer::new_for_http())
    }

    /// The complete app, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub fn reload_handles(&self) -> ReloadHandles {
        self.reload.clone()
    }

    /// Run the server until `shutdown_rx` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown::wait(shutdown_rx))
            .await?;

        self.pipeline.audit().shutdown();
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Gates in their fixed order. Disabled features are left out entirely.
fn build_gates(
    config: &GatewayConfig,
    maintenance: Arc<CachedFlag>,
    ip_rules: Arc<ArcSwap<IpRules>>,
) -> Vec<Arc<dyn Gate>> {
    let mut gates: Vec<Arc<dyn Gate>> = vec![Arc::new(MaintenanceGate::new(
        maintenance,
        config.maintenance.bypass_paths.clone(),
    ))];

    if config.rate_limit.enabled {
        gates.push(Arc::new(RateLimitGate::new(&config.rate_limit)));
    }
    gates.push(Arc::new(IpFilterGate::new(ip_rules)));
    gates.push(Arc::new(CorrelationGate));
    gates.push(Arc::new(SanitizeGate));
    gates.push(Arc::new(CookieGate));

    if config.environment.is_production() {
        match config.signature.secret.as_deref() {
            Some(secret) if !secret.is_empty() => gates.push(Arc::new(SignatureGate::new(
                secret.as_bytes(),
                config.signature.tolerance_secs,
                config.security.max_body_size,
            ))),
            _ => tracing::warn!("Production without a signature secret; signature gate disabled"),
        }
    }

    if config.csrf.enabled {
        gates.push(Arc::new(CsrfGate::new(config.csrf.clone())));
    }
    if config.tenancy.enabled {
        gates.push(Arc::new(TenantGate::new(config.tenancy.clone())));
    }
    gates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::Environment;

    #[test]
    fn test_gate_order() {
        let mut config = GatewayConfig::default();
        config.environment = Environment::Production;
        config.signature.secret = Some("k".into());
        config.tenancy.enabled = true;

        let flag = Arc::new(CachedFlag::new(
            Arc::new(StaticFlag::new(false)),
            Duration::from_secs(1),
        ));
        let rules = Arc::new(ArcSwap::from_pointee(IpRules::default()));
        let names: Vec<_> = build_gates(&config, flag, rules).iter().map(|g| g.name()).collect();
        assert_eq!(
            names,
            vec![
                "maintenance",
                "rate_limit",
                "ip_filter",
                "correlation",
                "sanitize",
                "cookies",
                "signature",
                "csrf",
                "tenant",
            ]
        );
    }

    #[test]
    fn test_signature_gate_only_in_production() {
        let mut config = GatewayConfig::default();
        config.signature.secret = Some("k".into());
        let flag = Arc::new(CachedFlag::new(
            Arc::new(StaticFlag::new(false)),
            Duration::from_secs(1),
        ));
        let rules = Arc::new(ArcSwap::from_pointee(IpRules::default()));
        let names: Vec<_> = build_gates(&config, flag, rules).iter().map(|g| g.name()).collect();
        assert!(!names.contains(&"signature"));
    }
}
