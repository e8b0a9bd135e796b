//! Fire-and-forget audit publication.
//!
//! The broker connects in the background. Until it is ready, each record
//! waits a bounded time for readiness and is dropped with a warning if the
//! wait expires. Nothing here ever fails a request.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::audit::broker::{AuditBroker, BrokerConnector, NullBroker};
use crate::audit::record::AuditRecord;
use crate::config::schema::AuditConfig;
use crate::observability::metrics;

type BrokerSlot = Option<Arc<dyn AuditBroker>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Published,
    /// Broker not ready within the wait budget.
    Skipped,
    /// Serialization or broker error; logged, not retried.
    Failed,
}

#[derive(Clone)]
pub struct AuditEmitter {
    inner: Arc<Inner>,
}

struct Inner {
    topic: String,
    ready_timeout: Duration,
    broker: watch::Sender<BrokerSlot>,
}

impl AuditEmitter {
    fn with_slot(topic: String, ready_timeout: Duration, slot: BrokerSlot) -> Self {
        let (broker, _) = watch::channel(slot);
        Self {
            inner: Arc::new(Inner {
                topic,
                ready_timeout,
                broker,
            }),
        }
    }

    /// Spawn the connection task and return immediately.
    pub fn start(connector: Arc<dyn BrokerConnector>, config: &AuditConfig) -> Self {
        if !config.enabled {
            return Self::disabled();
        }

        let emitter = Self::with_slot(
            config.topic.clone(),
            Duration::from_millis(config.ready_timeout_ms),
            None,
        );
        let inner = emitter.inner.clone();
        let connect_timeout = Duration::from_millis(config.connect_timeout_ms);

        tokio::spawn(async move {
            match tokio::time::timeout(connect_timeout, connector.connect()).await {
                Ok(Ok(broker)) => {
                    inner.broker.send_replace(Some(broker));
                    tracing::info!(topic = %inner.topic, "Audit broker connected");
                }
                Ok(Err(e)) => {
                    tracing::error!(error = %e, "Audit broker connection failed; records will be skipped");
                }
                Err(_) => {
                    tracing::error!(
                        timeout_ms = connect_timeout.as_millis() as u64,
                        "Audit broker connection timed out; records will be skipped"
                    );
                }
            }
        });

        emitter
    }

    /// Ready immediately; records go to a [`NullBroker`].
    pub fn disabled() -> Self {
        Self::with_slot(String::new(), Duration::ZERO, Some(Arc::new(NullBroker)))
    }

    /// Use an already-connected broker.
    pub fn with_broker(broker: Arc<dyn AuditBroker>, topic: impl Into<String>) -> Self {
        Self::with_slot(topic.into(), Duration::ZERO, Some(broker))
    }

    pub fn is_ready(&self) -> bool {
        self.inner.broker.borrow().is_some()
    }

    /// Queue a record without waiting.
    pub fn emit(&self, record: AuditRecord) {
        let this = self.clone();
        tokio::spawn(async move {
            this.publish(record).await;
        });
    }

    /// Publish one record, waiting at most the ready timeout for the broker.
    pub async fn publish(&self, record: AuditRecord) -> PublishOutcome {
        let outcome = self.publish_inner(&record).await;
        metrics::record_audit_event(match outcome {
            PublishOutcome::Published => "published",
            PublishOutcome::Skipped => "skipped",
            PublishOutcome::Failed => "failed",
        });
        outcome
    }

    async fn publish_inner(&self, record: &AuditRecord) -> PublishOutcome {
        let broker = match self.ready_broker().await {
            Some(broker) => broker,
            None => {
                tracing::warn!(record_id = %record.id, "Audit broker not ready, skipping record");
                return PublishOutcome::Skipped;
            }
        };

        let message = match serde_json::to_vec(record) {
            Ok(message) => message,
            Err(e) => {
                tracing::error!(record_id = %record.id, error = %e, "Failed to serialize audit record");
                return PublishOutcome::Failed;
            }
        };

        match broker.publish(&self.inner.topic, &message).await {
            Ok(()) => PublishOutcome::Published,
            Err(e) => {
                tracing::error!(record_id = %record.id, error = %e, "Audit publish failed");
                PublishOutcome::Failed
            }
        }
    }

    async fn ready_broker(&self) -> Option<Arc<dyn AuditBroker>> {
        let current = self.inner.broker.borrow().clone();
        if current.is_some() {
            return current;
        }

        let mut rx = self.inner.broker.subscribe();
        let waited = tokio::time::timeout(self.inner.ready_timeout, rx.wait_for(Option::is_some)).await;
        match waited {
            Ok(Ok(slot)) => slot.clone(),
            Ok(Err(_)) | Err(_) => None,
        }
    }

    /// Drop the broker connection. Later records are skipped.
    pub fn shutdown(&self) {
        if self.inner.broker.send_replace(None).is_some() {
            tracing::info!("Audit broker released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::broker::BrokerError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        messages: Mutex<Vec<(String, Vec<u8>)>>,
        fail: bool,
    }

    #[async_trait]
    impl AuditBroker for Recording {
        async fn publish(&self, topic: &str, message: &[u8]) -> Result<(), BrokerError> {
            if self.fail {
                return Err(BrokerError::Publish {
                    topic: topic.to_string(),
                    reason: "disk full".into(),
                });
            }
            self.messages
                .lock()
                .unwrap()
                .push((topic.to_string(), message.to_vec()));
            Ok(())
        }
    }

    struct Never;

    #[async_trait]
    impl BrokerConnector for Never {
        async fn connect(&self) -> Result<Arc<dyn AuditBroker>, BrokerError> {
            std::future::pending().await
        }
    }

    struct Slow(Arc<Recording>);

    #[async_trait]
    impl BrokerConnector for Slow {
        async fn connect(&self) -> Result<Arc<dyn AuditBroker>, BrokerError> {
            tokio::time::sleep(Duration::from_millis(30)).await;
            Ok(self.0.clone())
        }
    }

    fn config(ready_timeout_ms: u64) -> AuditConfig {
        AuditConfig {
            enabled: true,
            topic: "audit.test".into(),
            connect_timeout_ms: 1_000,
            ready_timeout_ms,
        }
    }

    fn record() -> AuditRecord {
        AuditRecord::success("GET", "/health", None)
    }

    #[tokio::test]
    async fn test_skips_when_broker_never_ready() {
        let emitter = AuditEmitter::start(Arc::new(Never), &config(20));
        assert_eq!(emitter.publish(record()).await, PublishOutcome::Skipped);
        assert!(!emitter.is_ready());
    }

    #[tokio::test]
    async fn test_waits_for_late_broker() {
        let broker = Arc::new(Recording::default());
        let emitter = AuditEmitter::start(Arc::new(Slow(broker.clone())), &config(500));

        assert_eq!(emitter.publish(record()).await, PublishOutcome::Published);
        let messages = broker.messages.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, "audit.test");
        let value: serde_json::Value = serde_json::from_slice(&messages[0].1).unwrap();
        assert_eq!(value["resource"], "/health");
    }

    #[tokio::test]
    async fn test_publish_failure_is_contained() {
        let broker = Arc::new(Recording {
            fail: true,
            ..Default::default()
        });
        let emitter = AuditEmitter::with_broker(broker, "audit.test");
        assert_eq!(emitter.publish(record()).await, PublishOutcome::Failed);

        // fire-and-forget path must not panic either
        emitter.emit(record());
        tokio::task::yield_now().await;
    }

    #[tokio::test]
    async fn test_shutdown_releases_broker() {
        let emitter = AuditEmitter::with_broker(Arc::new(Recording::default()), "audit.test");
        assert!(emitter.is_ready());
        emitter.shutdown();
        assert!(!emitter.is_ready());
        assert_eq!(emitter.publish(record()).await, PublishOutcome::Skipped);
    }
}
