use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Where the poller currently is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollerState {
    Idle,
    Fetching,
    Classifying,
    Dispatching,
}

/// Counters for one completed poll cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub fetched: usize,
    pub malformed: usize,
    pub breaking: usize,
    pub duplicates: usize,
    pub broadcast: usize,
    pub queued: usize,
    /// Dropped by a full `drop_newest` queue; left out of the dedup set
    pub rejected: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// Point-in-time copy of everything the monitor tracks
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub healthy: bool,
    pub poller_state: PollerState,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_cycle: Option<CycleReport>,
    pub last_fetch_error: Option<ErrorRecord>,
    pub last_persistence_error: Option<ErrorRecord>,
    pub cycles: u64,
    pub fetch_failures: u64,
    pub persistence_failures: u64,
    pub malformed_items: u64,
    pub delivery_failures: u64,
    pub flush_losses: u64,
    pub queue_evictions: u64,
}

/// Shared sink for the recoverable failures of the pipeline.
///
/// Components report here instead of propagating; the HTTP layer reads
/// snapshots for `/health` and `/api/v1/status`.
#[derive(Debug)]
pub struct HealthMonitor {
    poller_state: RwLock<PollerState>,
    last_cycle: RwLock<Option<(DateTime<Utc>, CycleReport)>>,
    last_fetch_error: RwLock<Option<ErrorRecord>>,
    last_persistence_error: RwLock<Option<ErrorRecord>>,
    persistence_ok: AtomicBool,
    cycles: AtomicU64,
    fetch_failures: AtomicU64,
    persistence_failures: AtomicU64,
    malformed_items: AtomicU64,
    delivery_failures: AtomicU64,
    flush_losses: AtomicU64,
    queue_evictions: AtomicU64,
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self {
            poller_state: RwLock::new(PollerState::Idle),
            last_cycle: RwLock::new(None),
            last_fetch_error: RwLock::new(None),
            last_persistence_error: RwLock::new(None),
            persistence_ok: AtomicBool::new(true),
            cycles: AtomicU64::new(0),
            fetch_failures: AtomicU64::new(0),
            persistence_failures: AtomicU64::new(0),
            malformed_items: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
            flush_losses: AtomicU64::new(0),
            queue_evictions: AtomicU64::new(0),
        }
    }

    pub fn set_poller_state(&self, state: PollerState) {
        *self.poller_state.write() = state;
    }

    pub fn poller_state(&self) -> PollerState {
        *self.poller_state.read()
    }

    pub fn record_cycle(&self, report: CycleReport) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        *self.last_cycle.write() = Some((Utc::now(), report));
    }

    pub fn record_fetch_failure(&self, message: impl Into<String>) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
        *self.last_fetch_error.write() = Some(ErrorRecord {
            at: Utc::now(),
            message: message.into(),
        });
    }

    pub fn record_persistence_failure(&self, message: impl Into<String>) {
        self.persistence_failures.fetch_add(1, Ordering::Relaxed);
        self.persistence_ok.store(false, Ordering::Relaxed);
        *self.last_persistence_error.write() = Some(ErrorRecord {
            at: Utc::now(),
            message: message.into(),
        });
    }

    pub fn record_persistence_success(&self) {
        self.persistence_ok.store(true, Ordering::Relaxed);
    }

    pub fn record_malformed_item(&self) {
        self.malformed_items.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery_failure(&self) {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flush_loss(&self) {
        self.flush_losses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_queue_eviction(&self) {
        self.queue_evictions.fetch_add(1, Ordering::Relaxed);
    }

    /// Healthy unless the most recent dedup write failed.
    pub fn is_healthy(&self) -> bool {
        self.persistence_ok.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let last_cycle = self.last_cycle.read().clone();
        HealthSnapshot {
            healthy: self.is_healthy(),
            poller_state: self.poller_state(),
            last_cycle_at: last_cycle.as_ref().map(|(at, _)| *at),
            last_cycle: last_cycle.map(|(_, report)| report),
            last_fetch_error: self.last_fetch_error.read().clone(),
            last_persistence_error: self.last_persistence_error.read().clone(),
            cycles: self.cycles.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            persistence_failures: self.persistence_failures.load(Ordering::Relaxed),
            malformed_items: self.malformed_items.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            flush_losses: self.flush_losses.load(Ordering::Relaxed),
            queue_evictions: self.queue_evictions.load(Ordering::Relaxed),
        }
    }
}
