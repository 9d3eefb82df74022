use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

use crate::health::HealthMonitor;
use crate::item::CandidateItem;
use crate::queue::{DeliveryQueue, Enqueued};
use crate::sessions::{ConnectionEvent, ConnectionRegistry};

/// What happened to a qualifying item handed to the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Sent to the registered sessions
    Broadcast { delivered: usize },
    /// No session connected; waiting in the queue
    Queued { depth: usize },
    /// Queue full under `drop_newest`; the item was discarded
    Rejected,
}

/// Outcome of draining the queue for a new connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub drained: usize,
    pub delivered: usize,
    /// Drained items that reached no session
    pub undelivered: usize,
    pub requeued: usize,
}

/// Routes qualifying items to live sessions or to the delivery queue.
///
/// The broadcast-or-enqueue decision runs under the queue lock. Since the
/// registry counts a session before announcing it, an item queued for lack
/// of sessions is always seen by the flush of the next connection.
pub struct Dispatcher {
    queue: Mutex<DeliveryQueue>,
    registry: Arc<ConnectionRegistry>,
    health: Arc<HealthMonitor>,
    requeue_undelivered: bool,
}

impl Dispatcher {
    pub fn new(
        queue: DeliveryQueue,
        registry: Arc<ConnectionRegistry>,
        health: Arc<HealthMonitor>,
    ) -> Self {
        Self {
            queue: Mutex::new(queue),
            registry,
            health,
            requeue_undelivered: false,
        }
    }

    /// Put flushed items that reached nobody back at the head of the queue
    /// instead of dropping them.
    pub fn with_requeue_undelivered(mut self, enabled: bool) -> Self {
        self.requeue_undelivered = enabled;
        self
    }

    pub fn handle_qualifying_item(&self, item: CandidateItem) -> Disposition {
        let mut queue = self.queue.lock();

        if self.registry.active_count() > 0 {
            let outcome = self.registry.broadcast(Arc::new(item));
            return Disposition::Broadcast {
                delivered: outcome.delivered,
            };
        }

        let id = item.id.clone();
        match queue.enqueue(item) {
            Enqueued::Accepted => {
                info!(item = %id, depth = queue.len(), "no active subscribers, alert queued");
                Disposition::Queued { depth: queue.len() }
            }
            Enqueued::EvictedOldest(evicted) => {
                warn!(item = %id, evicted = %evicted.id, "delivery queue full, oldest alert dropped");
                self.health.record_queue_eviction();
                Disposition::Queued { depth: queue.len() }
            }
            Enqueued::RejectedNewest(rejected) => {
                warn!(item = %rejected.id, "delivery queue full, alert dropped");
                self.health.record_queue_eviction();
                Disposition::Rejected
            }
        }
    }

    /// Drain the queue and broadcast each item in FIFO order.
    ///
    /// Drained items are not re-checked against the session count. One that
    /// reaches no session is lost unless requeueing is enabled.
    pub fn handle_new_connection(&self) -> FlushReport {
        let drained = self.queue.lock().drain_all();
        let mut report = FlushReport {
            drained: drained.len(),
            ..Default::default()
        };
        if drained.is_empty() {
            return report;
        }

        info!(count = drained.len(), "flushing queued alerts");
        let mut undelivered = Vec::new();
        for item in drained {
            let item = Arc::new(item);
            let outcome = self.registry.broadcast(Arc::clone(&item));
            if outcome.delivered > 0 {
                report.delivered += 1;
                continue;
            }

            report.undelivered += 1;
            if self.requeue_undelivered {
                undelivered.push(Arc::try_unwrap(item).unwrap_or_else(|shared| (*shared).clone()));
            } else {
                warn!(item = %item.id, "queued alert reached no subscriber and was lost");
                self.health.record_flush_loss();
            }
        }

        if !undelivered.is_empty() {
            report.requeued = undelivered.len();
            info!(count = report.requeued, "requeueing alerts that reached no subscriber");
            self.queue.lock().requeue_front(undelivered);
        }

        report
    }

    pub fn queued(&self) -> usize {
        self.queue.lock().len()
    }

    /// Consume registry events until shutdown, flushing on every connection.
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<ConnectionEvent>,
        shutdown: Arc<Notify>,
    ) {
        info!("dispatcher: listening for connection events");
        // Created once so a notification sent while a flush runs is not missed
        let shutdown_signal = shutdown.notified();
        tokio::pin!(shutdown_signal);

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(ConnectionEvent::Connected(session)) => {
                        let report = self.handle_new_connection();
                        if report.drained > 0 {
                            info!(
                                session = %session,
                                drained = report.drained,
                                delivered = report.delivered,
                                undelivered = report.undelivered,
                                "flush complete"
                            );
                        }
                    }
                    Some(ConnectionEvent::Disconnected(session)) => {
                        debug!(session = %session, "dispatcher saw disconnect");
                    }
                    None => {
                        info!("dispatcher: event channel closed");
                        break;
                    }
                },
                _ = &mut shutdown_signal => {
                    info!("dispatcher: shutdown requested, exiting loop");
                    break;
                }
            }
        }
    }
}
