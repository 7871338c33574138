//! Watched metastore
//!
//! Keeps a reader-mostly cache of the table mapping, refreshed by a
//! background task watching a coordination document. Reads never block on
//! I/O; they return the last known mapping.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::types::{MetaError, TableNames};
use super::Metastore;

/// A source of table mapping documents
#[async_trait]
pub trait MetaSource: Send + Sync {
    /// Fetch the current mapping; `None` when the document does not exist
    async fn fetch(&self) -> Result<Option<TableNames>, MetaError>;
}

/// HTTP coordination document: a JSON `TableNames` body at a fixed URL
pub struct HttpMetaSource {
    url: String,
    http: reqwest::Client,
}

impl HttpMetaSource {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl MetaSource for HttpMetaSource {
    async fn fetch(&self) -> Result<Option<TableNames>, MetaError> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| MetaError::Source(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let tables = response
            .error_for_status()
            .map_err(|e| MetaError::Source(e.to_string()))?
            .json::<TableNames>()
            .await
            .map_err(|e| MetaError::Source(e.to_string()))?;
        Ok(Some(tables))
    }
}

/// Metastore backed by a watcher task.
///
/// Falls through to static defaults while the watched value is missing, if
/// defaults are configured.
pub struct WatchedMetastore {
    cache: Arc<RwLock<Option<TableNames>>>,
    defaults: Option<TableNames>,
    watcher: JoinHandle<()>,
}

impl WatchedMetastore {
    /// Prime the cache and start the watcher
    pub async fn start(
        source: Arc<dyn MetaSource>,
        defaults: Option<TableNames>,
        poll_interval: Duration,
    ) -> Self {
        let cache = Arc::new(RwLock::new(None));

        match source.fetch().await {
            Ok(initial) => *cache.write().expect("metastore cache poisoned") = initial,
            Err(e) => warn!("initial metastore fetch failed: {}", e),
        }

        let watcher = tokio::spawn(watch(Arc::clone(&source), Arc::clone(&cache), poll_interval));

        Self {
            cache,
            defaults,
            watcher,
        }
    }
}

async fn watch(
    source: Arc<dyn MetaSource>,
    cache: Arc<RwLock<Option<TableNames>>>,
    poll_interval: Duration,
) {
    let mut interval = tokio::time::interval(poll_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        match source.fetch().await {
            Ok(Some(tables)) => {
                let mut cached = cache.write().expect("metastore cache poisoned");
                if cached.as_ref() != Some(&tables) {
                    info!(
                        "table mapping changed: tiles={}, points={}",
                        tables.tiles, tables.points
                    );
                    *cached = Some(tables);
                }
            }
            Ok(None) => {
                // document removed; keep serving the last known mapping
            }
            Err(e) => warn!("metastore refresh failed: {}", e),
        }
    }
}

impl Metastore for WatchedMetastore {
    fn tables(&self) -> Result<TableNames, MetaError> {
        let cached = self.cache.read().expect("metastore cache poisoned");
        cached
            .clone()
            .or_else(|| self.defaults.clone())
            .ok_or(MetaError::Missing)
    }
}

impl Drop for WatchedMetastore {
    fn drop(&mut self) {
        self.watcher.abort();
    }
}
