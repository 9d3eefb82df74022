use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::classifier::Classifier;
use crate::dedup::DedupStore;
use crate::dispatcher::{Disposition, Dispatcher};
use crate::error::{AlertError, Result};
use crate::health::{CycleReport, HealthMonitor, PollerState};
use crate::item::CandidateItem;
use crate::source::ContentSource;

/// Periodically pulls candidates from the source and feeds breaking,
/// not-yet-seen items to the dispatcher.
///
/// Cycles run one at a time: `run` awaits each cycle before waiting for the
/// next tick, so dedup checks never race with themselves.
pub struct Poller {
    source: Arc<dyn ContentSource>,
    classifier: Classifier,
    dedup: Arc<DedupStore>,
    dispatcher: Arc<Dispatcher>,
    health: Arc<HealthMonitor>,
    interval: Duration,
    fetch_timeout: Duration,
}

impl Poller {
    pub fn new(
        source: Arc<dyn ContentSource>,
        classifier: Classifier,
        dedup: Arc<DedupStore>,
        dispatcher: Arc<Dispatcher>,
        health: Arc<HealthMonitor>,
    ) -> Self {
        let defaults = common::PollerConfig::default();
        Self {
            source,
            classifier,
            dedup,
            dispatcher,
            health,
            interval: defaults.interval(),
            fetch_timeout: defaults.fetch_timeout(),
        }
    }

    pub fn with_schedule(mut self, interval: Duration, fetch_timeout: Duration) -> Self {
        self.interval = interval;
        self.fetch_timeout = fetch_timeout;
        self
    }

    /// Run cycles on the configured interval until `shutdown` is signalled.
    /// The first cycle starts immediately.
    pub async fn run(&self, shutdown: Arc<Notify>) {
        info!(interval = ?self.interval, fetch_timeout = ?self.fetch_timeout, "poller: starting");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let shutdown_signal = shutdown.notified();
        tokio::pin!(shutdown_signal);

        loop {
            select! {
                _ = ticker.tick() => {
                    // Errors are already logged and recorded; the next tick proceeds normally.
                    let _ = self.run_cycle().await;
                },
                _ = &mut shutdown_signal => {
                    info!("poller: shutdown requested, exiting loop");
                    break;
                }
            }
        }
    }

    /// One Fetching → Classifying → Dispatching pass.
    ///
    /// A failed or timed-out fetch ends the cycle before anything is
    /// classified or recorded.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        self.health.set_poller_state(PollerState::Fetching);
        let batch = match tokio::time::timeout(self.fetch_timeout, self.source.fetch_batch()).await {
            Ok(Ok(batch)) => batch,
            Ok(Err(e)) => return Err(self.abandon_cycle(e)),
            Err(_) => return Err(self.abandon_cycle(AlertError::FetchTimeout(self.fetch_timeout))),
        };
        let fetched_at = Utc::now();

        self.health.set_poller_state(PollerState::Classifying);
        let mut report = CycleReport {
            fetched: batch.len(),
            ..Default::default()
        };
        let mut qualifying: Vec<CandidateItem> = Vec::new();
        for raw in batch {
            match CandidateItem::from_raw(raw, fetched_at) {
                Ok(item) if self.classifier.is_breaking(&item) => qualifying.push(item),
                Ok(item) => debug!(item = %item.id, "not breaking, skipped"),
                Err(e) => {
                    debug!(error = %e, "skipping item");
                    self.health.record_malformed_item();
                    report.malformed += 1;
                }
            }
        }
        report.breaking = qualifying.len();

        self.health.set_poller_state(PollerState::Dispatching);
        for item in qualifying {
            if self.dedup.contains(&item.id).await {
                report.duplicates += 1;
                continue;
            }

            let id = item.id.clone();
            info!(item = %id, title = %item.title, "breaking news detected");
            match self.dispatcher.handle_qualifying_item(item) {
                Disposition::Broadcast { .. } => report.broadcast += 1,
                Disposition::Queued { .. } => report.queued += 1,
                Disposition::Rejected => {
                    // Not accepted, so a later cycle may offer it again
                    report.rejected += 1;
                    continue;
                }
            }
            // Recorded only after the dispatcher has the item: a crash in
            // between means a duplicate on restart, never a silent loss.
            self.dedup.mark_delivered(&id).await;
        }

        self.health.set_poller_state(PollerState::Idle);
        info!(
            fetched = report.fetched,
            breaking = report.breaking,
            duplicates = report.duplicates,
            broadcast = report.broadcast,
            queued = report.queued,
            rejected = report.rejected,
            malformed = report.malformed,
            "poll cycle complete"
        );
        self.health.record_cycle(report.clone());
        Ok(report)
    }

    fn abandon_cycle(&self, e: AlertError) -> AlertError {
        match &e {
            AlertError::FetchTimeout(_) => warn!(error = %e, "poller: fetch timed out, cycle skipped"),
            _ => error!(error = %e, "poller: fetch failed, cycle skipped"),
        }
        self.health.record_fetch_failure(e.to_string());
        self.health.set_poller_state(PollerState::Idle);
        e
    }
}
