//! Remotely controlled boolean flags with a TTL cache.
//!
//! The maintenance gate asks [`CachedFlag::get`] on every request. A fresh
//! cached value is returned without I/O. Once it goes stale exactly one
//! caller refreshes it while the others wait on the refresh lock and then
//! read the new value.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use thiserror::Error;
use url::Url;

use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum FlagError {
    #[error("flag request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("flag endpoint returned {0}")]
    Status(u16),
}

/// Where a flag value comes from.
#[async_trait]
pub trait FlagSource: Send + Sync {
    async fn fetch(&self) -> Result<bool, FlagError>;
}

/// In-process switch, flipped by config reloads or tests.
#[derive(Debug, Default)]
pub struct StaticFlag(AtomicBool);

impl StaticFlag {
    pub fn new(value: bool) -> Self {
        Self(AtomicBool::new(value))
    }

    pub fn set(&self, value: bool) {
        self.0.store(value, Ordering::Relaxed);
    }
}

#[async_trait]
impl FlagSource for StaticFlag {
    async fn fetch(&self) -> Result<bool, FlagError> {
        Ok(self.0.load(Ordering::Relaxed))
    }
}

#[derive(Debug, Deserialize)]
struct FlagBody {
    enabled: bool,
}

/// Polls an HTTP endpoint answering `{"enabled": bool}`.
pub struct HttpFlag {
    client: reqwest::Client,
    url: Url,
}

impl HttpFlag {
    pub fn new(url: Url, timeout: Duration) -> Result<Self, FlagError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl FlagSource for HttpFlag {
    async fn fetch(&self) -> Result<bool, FlagError> {
        let res = self.client.get(self.url.clone()).send().await?;
        if !res.status().is_success() {
            return Err(FlagError::Status(res.status().as_u16()));
        }
        let body: FlagBody = res.json().await?;
        Ok(body.enabled)
    }
}

#[derive(Debug, Clone, Copy)]
struct Cached {
    value: bool,
    fetched_at: Instant,
}

pub struct CachedFlag {
    source: Arc<dyn FlagSource>,
    ttl: Duration,
    cached: RwLock<Option<Cached>>,
    refresh: tokio::sync::Mutex<()>,
}

impl CachedFlag {
    pub fn new(source: Arc<dyn FlagSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            cached: RwLock::new(None),
            refresh: tokio::sync::Mutex::new(()),
        }
    }

    fn fresh(&self) -> Option<bool> {
        let guard = self.cached.read().unwrap_or_else(|e| e.into_inner());
        guard
            .filter(|c| c.fetched_at.elapsed() < self.ttl)
            .map(|c| c.value)
    }

    /// Current flag value. A failed refresh keeps the last known value
    /// (false if none) and is not retried until the TTL elapses again.
    pub async fn get(&self) -> bool {
        if let Some(value) = self.fresh() {
            return value;
        }

        let _refreshing = self.refresh.lock().await;
        if let Some(value) = self.fresh() {
            return value;
        }

        let value = match self.source.fetch().await {
            Ok(value) => {
                metrics::record_flag_refresh("ok");
                value
            }
            Err(e) => {
                metrics::record_flag_refresh("error");
                let last = self
                    .cached
                    .read()
                    .unwrap_or_else(|e| e.into_inner())
                    .map(|c| c.value)
                    .unwrap_or(false);
                tracing::warn!(error = %e, last_known = last, "Flag refresh failed");
                last
            }
        };

        *self.cached.write().unwrap_or_else(|e| e.into_inner()) = Some(Cached {
            value,
            fetched_at: Instant::now(),
        });
        value
    }

    /// Force the next `get` to hit the source.
    pub fn invalidate(&self) {
        *self.cached.write().unwrap_or_else(|e| e.into_inner()) = None;
    }
}
