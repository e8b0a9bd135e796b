//! Configuration file watcher for hot reload.
//!
//! Only the IP rules and the static maintenance switch are applied live;
//! everything else needs a restart. The parent directory is watched so
//! editors that replace the file by rename are still picked up.

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::GatewayConfig;

pub struct ConfigWatcher {
    path: PathBuf,
    updates: mpsc::UnboundedSender<GatewayConfig>,
}

/// Whether `event` is a write or replacement of `target`.
fn touches(event: &Event, target: &Path) -> bool {
    matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
        && event
            .paths
            .iter()
            .any(|p| p.file_name() == target.file_name())
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver of configs that parsed and validated.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<GatewayConfig>) {
        let (updates, rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            updates,
        };
        (watcher, rx)
    }

    fn reload(path: &Path, updates: &mpsc::UnboundedSender<GatewayConfig>) {
        match load_config(path) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "Configuration change accepted");
                if updates.send(config).is_err() {
                    tracing::debug!("No reload consumer left");
                }
            }
            Err(e) => tracing::error!(
                path = %path.display(),
                error = %e,
                "Rejected configuration change, keeping current configuration"
            ),
        }
    }

    /// Start watching. Dropping the returned watcher stops it.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self { path, updates } = self;
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let target = path.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if touches(&event, &target) => Self::reload(&target, &updates),
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = %path.display(), "Config watcher started");
        Ok(watcher)
    }
}
