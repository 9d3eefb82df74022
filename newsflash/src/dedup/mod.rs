use anyhow::Context;
use common::{StoreBackend, StoreConfig};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::health::HealthMonitor;

pub mod json_file;
pub mod sqlite;

pub use json_file::JsonFileBackend;
pub use sqlite::SqliteBackend;

/// Durable storage for the list of already-notified ids
#[async_trait::async_trait]
pub trait DedupBackend: Send + Sync {
    /// Read the persisted list. `None` means nothing was ever persisted.
    async fn load(&self) -> Result<Option<Vec<String>>>;

    /// Replace the persisted list with `ids`.
    async fn save(&self, ids: &[String]) -> Result<()>;

    /// Human-readable location, for logs
    fn describe(&self) -> String;
}

/// Build the backend selected in the configuration.
pub async fn backend_from_config(config: &StoreConfig) -> anyhow::Result<Box<dyn DedupBackend>> {
    match config.backend {
        StoreBackend::Json => Ok(Box::new(JsonFileBackend::new(&config.path))),
        StoreBackend::Sqlite => {
            let pool = common::init_db_pool(&config.path)
                .await
                .context("failed to open dedup database")?;
            let backend = SqliteBackend::new(pool)
                .await
                .context("failed to prepare dedup schema")?;
            Ok(Box::new(backend))
        }
    }
}

#[derive(Debug, Default)]
struct NotifiedSet {
    // Delivery order, which is also the persisted order
    order: Vec<String>,
    index: HashSet<String>,
}

impl NotifiedSet {
    fn from_ids(ids: Vec<String>) -> Self {
        let mut set = Self::default();
        for id in ids {
            if set.index.insert(id.clone()) {
                set.order.push(id);
            }
        }
        set
    }
}

/// Set of item ids that have been accepted for delivery. Grows monotonically.
///
/// The lock is held across the backend write so snapshots reach storage in
/// the order they were taken.
pub struct DedupStore {
    notified: Mutex<NotifiedSet>,
    backend: Box<dyn DedupBackend>,
    health: Arc<HealthMonitor>,
}

impl DedupStore {
    /// Load the persisted set. An absent record starts an empty set and
    /// creates the record; an unreadable record is an error.
    pub async fn open(backend: Box<dyn DedupBackend>, health: Arc<HealthMonitor>) -> Result<Self> {
        let location = backend.describe();
        let notified = match backend.load().await? {
            Some(ids) => {
                let set = NotifiedSet::from_ids(ids);
                info!(store = %location, count = set.order.len(), "dedup store loaded");
                set
            }
            None => {
                info!(store = %location, "no dedup record found, starting empty");
                match backend.save(&[]).await {
                    Ok(()) => health.record_persistence_success(),
                    Err(e) => {
                        warn!(store = %location, error = %e, "failed to create dedup record");
                        health.record_persistence_failure(e.to_string());
                    }
                }
                NotifiedSet::default()
            }
        };

        Ok(Self {
            notified: Mutex::new(notified),
            backend,
            health,
        })
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.notified.lock().await.index.contains(id)
    }

    /// Record `id` as delivered and persist the set.
    ///
    /// Returns false when the id was already known; nothing is written then.
    /// A failed write keeps the in-memory entry and is reported to health.
    pub async fn mark_delivered(&self, id: &str) -> bool {
        let mut notified = self.notified.lock().await;
        if !notified.index.insert(id.to_string()) {
            debug!(id, "already marked delivered");
            return false;
        }
        notified.order.push(id.to_string());

        match self.backend.save(&notified.order).await {
            Ok(()) => self.health.record_persistence_success(),
            Err(e) => {
                error!(id, store = %self.backend.describe(), error = %e, "failed to persist dedup store");
                self.health.record_persistence_failure(e.to_string());
            }
        }
        true
    }

    pub async fn len(&self) -> usize {
        self.notified.lock().await.order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
