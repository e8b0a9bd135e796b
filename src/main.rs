//! Secure Request Gateway
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ maintenance → rate limit → IP filter → correlation id
//!                     → sanitize → cookies → [signature] → csrf → [tenant]
//!                                                                   │
//!                                                                   ▼
//!                     ┌──────────────────── secure dispatcher ───────────────────┐
//!                     │ resolve operation → session → decode → authorize         │
//!                     │ → application handler → encode                           │
//!                     └──────────────────────────────────────────────────────────┘
//!                                                                   │
//!     Client Response                                               ▼
//!     ◀────────────── uniform errors + correlation id ◀── audit emit (async)
//! ```

use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;

use secure_gateway::audit::{BrokerConnector, LogConnector};
use secure_gateway::authz::{Authorizer, MemoryRbacStore};
use secure_gateway::config::{load_config, ConfigWatcher, GatewayConfig};
use secure_gateway::crypto::ServerKeys;
use secure_gateway::http::{Collaborators, GatewayServer};
use secure_gateway::lifecycle::{signals, Shutdown};
use secure_gateway::observability::{logging, metrics};
use secure_gateway::session::MemorySessionStore;

#[derive(Parser)]
#[command(name = "secure-gateway")]
#[command(about = "Secure request gateway", long_about = None)]
struct Args {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init(&config.observability);
    tracing::info!("secure-gateway v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        environment = ?config.environment,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let keys = match &config.crypto.private_key_path {
        Some(path) => ServerKeys::load(Path::new(path))?,
        None => {
            tracing::warn!(
                bits = config.crypto.ephemeral_key_bits,
                "No private key configured, generating an ephemeral key pair"
            );
            ServerKeys::generate(config.crypto.ephemeral_key_bits)?
        }
    };

    let rbac = Arc::new(MemoryRbacStore::new());
    rbac.seed(&config.rbac.roles)?;
    let connector: Arc<dyn BrokerConnector> = Arc::new(LogConnector);
    let collaborators = Collaborators {
        sessions: Arc::new(MemorySessionStore::new()),
        authorizer: Arc::new(Authorizer::from_store(rbac)),
        audit: connector,
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = GatewayServer::new(config, keys, collaborators)?;

    let shutdown = Shutdown::new();
    tokio::spawn(signals::shutdown_on_signal(shutdown.clone()));

    // Hot reload; the watcher stops when dropped at the end of main.
    let _watcher = match &args.config {
        Some(path) => {
            let (watcher, mut updates) = ConfigWatcher::new(path);
            let reload = server.reload_handles();
            tokio::spawn(async move {
                while let Some(new_config) = updates.recv().await {
                    reload.apply(&new_config);
                }
            });
            match watcher.run() {
                Ok(w) => Some(w),
                Err(e) => {
                    tracing::error!(error = %e, "Config watcher failed to start");
                    None
                }
            }
        }
        None => None,
    };

    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
