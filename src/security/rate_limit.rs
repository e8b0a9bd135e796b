//! Per-client token-bucket rate limiting.

use async_trait::async_trait;
use axum::{body::Body, http::Request};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::schema::RateLimitConfig;
use crate::http::error::GatewayError;
use crate::http::request::ClientAddr;
use crate::observability::metrics;
use crate::pipeline::gate::{Gate, GateResult, Proceed};

/// Buckets idle this long are dropped on the next prune.
const IDLE_EVICTION: Duration = Duration::from_secs(300);
/// Prune once the map grows past this many keys...
const PRUNE_THRESHOLD: usize = 10_000;
/// ...and at most this often, so a full map doesn't cost a scan per request.
const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// A simple token bucket rate limiter.
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    fn try_acquire(&mut self, capacity: f64, refill_rate: f64) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update).as_secs_f64();

        // Refill tokens
        self.tokens = (self.tokens + elapsed * refill_rate).min(capacity);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Whole seconds until one token is available.
    fn retry_after(&self, refill_rate: f64) -> u64 {
        let missing = (1.0 - self.tokens).max(0.0);
        (missing / refill_rate).ceil().max(1.0) as u64
    }
}

struct Buckets {
    map: HashMap<String, TokenBucket>,
    last_prune: Instant,
}

impl Buckets {
    fn new() -> Self {
        Self {
            map: HashMap::new(),
            last_prune: Instant::now(),
        }
    }

    /// Drop idle buckets if the map is large and the last prune is old enough.
    fn maybe_prune(&mut self, now: Instant) -> bool {
        if self.map.len() <= PRUNE_THRESHOLD
            || now.duration_since(self.last_prune) < PRUNE_INTERVAL
        {
            return false;
        }
        let before = self.map.len();
        self.map
            .retain(|_, b| now.duration_since(b.last_update) < IDLE_EVICTION);
        self.last_prune = now;
        tracing::debug!(before, after = self.map.len(), "Pruned idle rate-limit buckets");
        true
    }
}

pub struct RateLimiter {
    buckets: Mutex<Buckets>,
    rps: f64,
    burst: f64,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            buckets: Mutex::new(Buckets::new()),
            rps: config.requests_per_second as f64,
            burst: config.burst_size as f64,
        }
    }

    /// `Err(retry_after_secs)` when the key is out of tokens.
    pub fn check(&self, key: &str) -> Result<(), u64> {
        let mut buckets = self.buckets.lock().unwrap_or_else(|e| e.into_inner());
        buckets.maybe_prune(Instant::now());

        let bucket = buckets
            .map
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(self.burst));

        if bucket.try_acquire(self.burst, self.rps) {
            Ok(())
        } else {
            Err(bucket.retry_after(self.rps))
        }
    }
}

/// Keys buckets by client address; requests without one share a bucket.
pub struct RateLimitGate {
    limiter: RateLimiter,
}

impl RateLimitGate {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            limiter: RateLimiter::new(config),
        }
    }
}

#[async_trait]
impl Gate for RateLimitGate {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    async fn apply(&self, req: Request<Body>, next: Proceed<'_>) -> GateResult {
        let key = match req.extensions().get::<ClientAddr>() {
            Some(ClientAddr(Some(ip))) => ip.to_string(),
            _ => "unknown".to_string(),
        };

        if let Err(retry_after_secs) = self.limiter.check(&key) {
            tracing::warn!(client = %key, "Rate limit exceeded");
            metrics::record_gate_rejection(self.name());
            return Err(GatewayError::RateLimited { retry_after_secs });
        }
        next.run(req).await
    }
}
