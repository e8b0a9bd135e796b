//! Runs the gate chain for every request and renders the outcome.

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::Response,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::audit::{AuditEmitter, AuditRecord};
use crate::http::error::{ErrorReport, GatewayError};
use crate::http::request::{resolve_client_ip, ClientAddr};
use crate::observability::metrics;
use crate::pipeline::gate::{Gate, Proceed, Terminal};
use crate::pipeline::trace::RequestTrace;

/// The fixed gate sequence plus its terminal stage.
pub struct Pipeline {
    gates: Vec<Arc<dyn Gate>>,
    terminal: Arc<dyn Terminal>,
    audit: AuditEmitter,
    trust_forwarded_for: bool,
    request_timeout: Option<Duration>,
}

impl Pipeline {
    pub fn new(
        gates: Vec<Arc<dyn Gate>>,
        terminal: Arc<dyn Terminal>,
        audit: AuditEmitter,
        trust_forwarded_for: bool,
    ) -> Self {
        Self {
            gates,
            terminal,
            audit,
            trust_forwarded_for,
            request_timeout: None,
        }
    }

    /// Bound the whole chain. An expiry is rendered and audited like any
    /// other error.
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.request_timeout = Some(limit);
        self
    }

    pub fn gate_names(&self) -> Vec<&'static str> {
        self.gates.iter().map(|g| g.name()).collect()
    }

    pub fn audit(&self) -> &AuditEmitter {
        &self.audit
    }

    /// Exactly one response per request, whatever happens in the chain.
    pub async fn run(&self, mut req: Request<Body>) -> Response {
        let start = Instant::now();
        let method = req.method().to_string();
        let resource = req.uri().path().to_string();
        let client_ip = resolve_client_ip(&req, self.trust_forwarded_for);

        let trace = RequestTrace::new();
        req.extensions_mut().insert(ClientAddr(client_ip));
        req.extensions_mut().insert(trace.clone());

        let chain = Proceed::new(&self.gates, self.terminal.as_ref()).run(req);
        let result = match self.request_timeout {
            Some(limit) => tokio::time::timeout(limit, chain)
                .await
                .unwrap_or_else(|_| Err(GatewayError::Timeout(limit))),
            None => chain.await,
        };

        let correlation_id = trace.correlation_id();
        let (response, error) = match result {
            Ok(response) if response.status().as_u16() < 400 => (response, None),
            Ok(response) => match response.extensions().get::<ErrorReport>().cloned() {
                // rendered by a handler, before the correlation id was known
                Some(report) => {
                    let detail = report.detail().to_string();
                    (report.render(correlation_id), Some(detail))
                }
                None => {
                    let reason = response
                        .status()
                        .canonical_reason()
                        .unwrap_or("rejected")
                        .to_string();
                    (response, Some(reason))
                }
            },
            Err(err) => {
                let status = err.status();
                if status.is_server_error() {
                    tracing::error!(
                        correlation_id = correlation_id.unwrap_or("-"),
                        method = %method,
                        path = %resource,
                        status = status.as_u16(),
                        error = %err,
                        "Request failed"
                    );
                } else {
                    tracing::warn!(
                        correlation_id = correlation_id.unwrap_or("-"),
                        method = %method,
                        path = %resource,
                        status = status.as_u16(),
                        error = %err,
                        "Request rejected"
                    );
                }
                let message = err.to_string();
                (err.into_response_with(correlation_id), Some(message))
            }
        };

        let status = response.status().as_u16();
        metrics::record_request(&method, status, start);

        let ip = client_ip.map(|ip| ip.to_string());
        let record = match error {
            None => AuditRecord::success(&method, &resource, ip),
            Some(error) => AuditRecord::failure(&method, &resource, ip, error),
        };
        self.audit.emit(record.with_details(serde_json::json!({
            "correlationId": correlation_id,
            "userId": trace.user_id(),
            "tenant": trace.tenant(),
            "statusCode": status,
            "durationMs": start.elapsed().as_millis() as u64,
        })));

        response
    }
}

/// Axum fallback handler feeding every request into the pipeline.
pub async fn serve(State(pipeline): State<Arc<Pipeline>>, req: Request<Body>) -> Response {
    pipeline.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditBroker, BrokerError};
    use crate::pipeline::gate::GateResult;
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use std::sync::Mutex;

    struct Record {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Gate for Record {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn apply(&self, req: Request<Body>, next: Proceed<'_>) -> GateResult {
            self.log.lock().unwrap().push(self.name);
            next.run(req).await
        }
    }

    struct Halt;

    #[async_trait]
    impl Gate for Halt {
        fn name(&self) -> &'static str {
            "halt"
        }

        async fn apply(&self, _req: Request<Body>, _next: Proceed<'_>) -> GateResult {
            Ok((StatusCode::IM_A_TEAPOT, "short and stout").into_response())
        }
    }

    struct Reject;

    #[async_trait]
    impl Gate for Reject {
        fn name(&self) -> &'static str {
            "reject"
        }

        async fn apply(&self, _req: Request<Body>, _next: Proceed<'_>) -> GateResult {
            Err(GatewayError::Forbidden)
        }
    }

    struct Ok200(Arc<Mutex<Vec<&'static str>>>);

    #[async_trait]
    impl Terminal for Ok200 {
        async fn dispatch(&self, _req: Request<Body>) -> GateResult {
            self.0.lock().unwrap().push("terminal");
            Ok(StatusCode::OK.into_response())
        }
    }

    fn pipeline(gates: Vec<Arc<dyn Gate>>, log: &Arc<Mutex<Vec<&'static str>>>) -> Pipeline {
        Pipeline::new(gates, Arc::new(Ok200(log.clone())), AuditEmitter::disabled(), false)
    }

    fn recorder(name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>) -> Arc<dyn Gate> {
        Arc::new(Record {
            name,
            log: log.clone(),
        })
    }

    #[tokio::test]
    async fn test_gates_run_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let p = pipeline(vec![recorder("a", &log), recorder("b", &log), recorder("c", &log)], &log);
        assert_eq!(p.gate_names(), vec!["a", "b", "c"]);

        let res = p.run(Request::new(Body::empty())).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c", "terminal"]);
    }

    #[tokio::test]
    async fn test_halting_gate_stops_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let p = pipeline(vec![recorder("a", &log), Arc::new(Halt), recorder("b", &log)], &log);

        let res = p.run(Request::new(Body::empty())).await;
        assert_eq!(res.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(*log.lock().unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_error_is_rendered() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let p = pipeline(vec![Arc::new(Reject), recorder("a", &log)], &log);

        let res = p.run(Request::new(Body::empty())).await;
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        assert!(log.lock().unwrap().is_empty());
    }

    struct Stall;

    #[async_trait]
    impl Terminal for Stall {
        async fn dispatch(&self, _req: Request<Body>) -> GateResult {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(StatusCode::OK.into_response())
        }
    }

    struct Teapot;

    #[async_trait]
    impl Terminal for Teapot {
        async fn dispatch(&self, _req: Request<Body>) -> GateResult {
            // as an application handler would render it
            Ok(GatewayError::InvalidInput("bad key".into()).into_response())
        }
    }

    #[derive(Default)]
    struct Published(Mutex<Vec<serde_json::Value>>);

    #[async_trait]
    impl AuditBroker for Published {
        async fn publish(&self, _topic: &str, message: &[u8]) -> Result<(), BrokerError> {
            self.0.lock().unwrap().push(serde_json::from_slice(message).unwrap());
            Ok(())
        }
    }

    impl Published {
        async fn one(&self) -> serde_json::Value {
            for _ in 0..100 {
                if let Some(record) = self.0.lock().unwrap().first() {
                    return record.clone();
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("no audit record published");
        }
    }

    #[tokio::test]
    async fn test_timeout_is_rendered_and_audited() {
        let broker = Arc::new(Published::default());
        let p = Pipeline::new(
            Vec::new(),
            Arc::new(Stall),
            AuditEmitter::with_broker(broker.clone(), "audit"),
            false,
        )
        .with_timeout(Duration::from_millis(50));

        let res = p.run(Request::new(Body::empty())).await;
        assert_eq!(res.status(), StatusCode::GATEWAY_TIMEOUT);

        let record = broker.one().await;
        assert_eq!(record["status"], "failure");
        assert_eq!(record["error"], "request timed out after 50ms");
        assert_eq!(record["details"]["statusCode"], 504);
    }

    #[tokio::test]
    async fn test_handler_error_keeps_its_cause() {
        let broker = Arc::new(Published::default());
        let gates: Vec<Arc<dyn Gate>> = vec![Arc::new(crate::http::request::CorrelationGate)];
        let p = Pipeline::new(
            gates,
            Arc::new(Teapot),
            AuditEmitter::with_broker(broker.clone(), "audit"),
            false,
        );

        let req = Request::builder()
            .header("x-correlation-id", "req-7")
            .body(Body::empty())
            .unwrap();
        let res = p.run(req).await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(res.headers()["x-correlation-id"], "req-7");

        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["correlation_id"], "req-7");

        let record = broker.one().await;
        assert_eq!(record["error"], "invalid input: bad key");
        assert_eq!(record["details"]["correlationId"], "req-7");
    }
}
