//! Shared helpers for the integration tests.
#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Request},
    response::Response,
    Router,
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use secure_gateway::audit::{AuditBroker, BrokerConnector, BrokerError, LogConnector};
use secure_gateway::authz::{Authorizer, MemoryRbacStore};
use secure_gateway::config::schema::Environment;
use secure_gateway::config::GatewayConfig;
use secure_gateway::crypto::envelope::{decode, seal};
use secure_gateway::crypto::ServerKeys;
use secure_gateway::http::{Collaborators, GatewayServer};
use secure_gateway::session::{MemorySessionStore, NewSession, SessionStore};

fn cached_pem(cell: &'static OnceLock<String>) -> &'static str {
    cell.get_or_init(|| {
        ServerKeys::generate(1024)
            .and_then(|k| k.private_key_pem())
            .unwrap()
    })
}

/// Same key pair for every test in a binary; generation is slow.
pub fn server_keys() -> ServerKeys {
    static PEM: OnceLock<String> = OnceLock::new();
    ServerKeys::from_pem(cached_pem(&PEM)).unwrap()
}

/// The "client" side: its public key goes into sessions.
pub fn client_keys() -> ServerKeys {
    static PEM: OnceLock<String> = OnceLock::new();
    ServerKeys::from_pem(cached_pem(&PEM)).unwrap()
}

/// Local environment, with the gates that need extra headers switched off.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.environment = Environment::Local;
    config.csrf.enabled = false;
    config.rate_limit.enabled = false;
    config.observability.metrics_enabled = false;
    config.audit.ready_timeout_ms = 200;
    config
}

pub struct TestApp {
    pub server: GatewayServer,
    pub sessions: Arc<MemorySessionStore>,
    pub rbac: Arc<MemoryRbacStore>,
}

impl TestApp {
    pub fn router(&self) -> Router {
        self.server.router()
    }

    /// A session holding the client public key, optionally logged in.
    pub async fn session(&self, user_id: Option<i64>) -> String {
        let session = self
            .sessions
            .create(NewSession {
                public_key: Some(client_keys().public_key_pem().to_string()),
                device_id: Some("test-device".into()),
                user_id,
                ttl: chrono::Duration::hours(1),
            })
            .await
            .unwrap();
        session.token
    }
}

pub fn spawn_app(config: GatewayConfig) -> TestApp {
    spawn_app_with_audit(config, Arc::new(LogConnector))
}

pub fn spawn_app_with_audit(config: GatewayConfig, audit: Arc<dyn BrokerConnector>) -> TestApp {
    let sessions = Arc::new(MemorySessionStore::new());
    let rbac = Arc::new(MemoryRbacStore::new());
    rbac.seed(&config.rbac.roles).unwrap();

    let server = GatewayServer::new(
        config,
        server_keys(),
        Collaborators {
            sessions: sessions.clone(),
            authorizer: Arc::new(Authorizer::from_store(rbac.clone())),
            audit,
        },
    )
    .unwrap();

    TestApp {
        server,
        sessions,
        rbac,
    }
}

/// Envelope JSON for `value`, sealed to the server key.
pub fn sealed_body(value: &Value) -> String {
    let envelope = seal(value, &server_keys().public_key()).unwrap();
    serde_json::to_string(&envelope).unwrap()
}

/// Open a response envelope with the client key.
pub fn open(body: &[u8]) -> Value {
    decode(body, client_keys().private_key()).unwrap()
}

pub fn json_request(method: &str, uri: &str, body: String, session: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = session {
        builder = builder.header(header::COOKIE, format!("session_token={token}"));
    }
    builder.body(Body::from(body)).unwrap()
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Connects instantly and keeps every published record, decoded.
#[derive(Clone, Default)]
pub struct RecordingConnector {
    records: Arc<Mutex<Vec<(String, Value)>>>,
}

struct RecordingBroker(Arc<Mutex<Vec<(String, Value)>>>);

#[async_trait]
impl AuditBroker for RecordingBroker {
    async fn publish(&self, topic: &str, message: &[u8]) -> Result<(), BrokerError> {
        let record = serde_json::from_slice(message).unwrap();
        self.0.lock().unwrap().push((topic.to_string(), record));
        Ok(())
    }
}

#[async_trait]
impl BrokerConnector for RecordingConnector {
    async fn connect(&self) -> Result<Arc<dyn AuditBroker>, BrokerError> {
        Ok(Arc::new(RecordingBroker(self.records.clone())))
    }
}

impl RecordingConnector {
    /// Wait until `n` records arrived, then give them a moment to be the
    /// only ones.
    pub async fn wait_for(&self, n: usize) -> Vec<(String, Value)> {
        for _ in 0..200 {
            if self.records.lock().unwrap().len() >= n {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.records.lock().unwrap().clone()
    }
}
