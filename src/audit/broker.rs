//! Broker abstraction for audit delivery.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker connection failed: {0}")]
    Connect(String),

    #[error("publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },
}

/// A connected message broker.
#[async_trait]
pub trait AuditBroker: Send + Sync {
    async fn publish(&self, topic: &str, message: &[u8]) -> Result<(), BrokerError>;
}

/// Produces a broker connection. Called once, in the background, at startup.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn AuditBroker>, BrokerError>;
}

/// Writes audit records to the `audit` tracing target.
pub struct LogBroker;

#[async_trait]
impl AuditBroker for LogBroker {
    async fn publish(&self, topic: &str, message: &[u8]) -> Result<(), BrokerError> {
        tracing::info!(target: "audit", topic, record = %String::from_utf8_lossy(message));
        Ok(())
    }
}

pub struct LogConnector;

#[async_trait]
impl BrokerConnector for LogConnector {
    async fn connect(&self) -> Result<Arc<dyn AuditBroker>, BrokerError> {
        Ok(Arc::new(LogBroker))
    }
}

/// Accepts and discards everything.
pub struct NullBroker;

#[async_trait]
impl AuditBroker for NullBroker {
    async fn publish(&self, _topic: &str, _message: &[u8]) -> Result<(), BrokerError> {
        Ok(())
    }
}
