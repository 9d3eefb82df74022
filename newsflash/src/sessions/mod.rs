//! Registry of live subscriber sessions.
//!
//! Each session gets a bounded channel; `broadcast` fans an alert out to all
//! of them without blocking. Connect and disconnect are published as
//! [`ConnectionEvent`]s so the dispatcher can flush its queue when someone
//! arrives.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::error::{AlertError, Result};
use crate::health::HealthMonitor;
use crate::item::CandidateItem;

pub mod websocket;

pub type SessionId = String;

/// Session lifecycle notifications emitted by the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected(SessionId),
    Disconnected(SessionId),
}

/// How one broadcast went
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastOutcome {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Debug)]
struct SessionEntry {
    // Distinguishes a reconnect under the same id from the handle being dropped
    generation: u64,
    sender: mpsc::Sender<Arc<CandidateItem>>,
}

#[derive(Debug)]
pub struct ConnectionRegistry {
    sessions: RwLock<HashMap<SessionId, SessionEntry>>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    next_generation: AtomicU64,
    buffer: usize,
    health: Arc<HealthMonitor>,
}

impl ConnectionRegistry {
    /// Create a registry whose sessions buffer up to `buffer` alerts each.
    /// The returned receiver carries connect/disconnect events.
    pub fn new(
        buffer: usize,
        health: Arc<HealthMonitor>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let registry = Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            events,
            next_generation: AtomicU64::new(1),
            buffer: buffer.max(1),
            health,
        });
        (registry, events_rx)
    }

    /// Register a session and announce it. The session is visible to
    /// `active_count` before the `Connected` event is sent.
    ///
    /// Dropping the returned [`Subscription`] unregisters the session.
    pub fn on_connect(self: &Arc<Self>, session_id: impl Into<SessionId>) -> Result<Subscription> {
        let id = session_id.into();
        let (sender, receiver) = mpsc::channel(self.buffer);
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        {
            let mut sessions = self.sessions.write();
            if sessions.contains_key(&id) {
                return Err(AlertError::DuplicateSession(id));
            }
            sessions.insert(id.clone(), SessionEntry { generation, sender });
        }

        info!(session = %id, active = self.active_count(), "subscriber connected");
        if self.events.send(ConnectionEvent::Connected(id.clone())).is_err() {
            debug!(session = %id, "no listener for connection events");
        }

        Ok(Subscription {
            id,
            generation,
            receiver,
            registry: Arc::clone(self),
        })
    }

    /// Remove a session. Returns false if it was not registered.
    pub fn on_disconnect(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().remove(session_id).is_some();
        if removed {
            self.announce_disconnect(session_id);
        }
        removed
    }

    fn release(&self, session_id: &str, generation: u64) {
        let removed = {
            let mut sessions = self.sessions.write();
            match sessions.get(session_id) {
                Some(entry) if entry.generation == generation => sessions.remove(session_id).is_some(),
                _ => false,
            }
        };
        if removed {
            self.announce_disconnect(session_id);
        }
    }

    fn announce_disconnect(&self, session_id: &str) {
        info!(session = %session_id, active = self.active_count(), "subscriber disconnected");
        if self
            .events
            .send(ConnectionEvent::Disconnected(session_id.to_string()))
            .is_err()
        {
            debug!(session = %session_id, "no listener for connection events");
        }
    }

    pub fn active_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Best-effort fan-out to every registered session.
    ///
    /// A full session buffer counts as a delivery failure for that session
    /// only. A closed channel means the session is going away and is skipped.
    pub fn broadcast(&self, item: Arc<CandidateItem>) -> BroadcastOutcome {
        let mut outcome = BroadcastOutcome::default();
        let sessions = self.sessions.read();

        for (id, entry) in sessions.iter() {
            match entry.sender.try_send(Arc::clone(&item)) {
                Ok(()) => outcome.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    let err = AlertError::Delivery {
                        session: id.clone(),
                        reason: "outbound buffer full".to_string(),
                    };
                    warn!(item = %item.id, error = %err, "alert not delivered");
                    self.health.record_delivery_failure();
                    outcome.failed += 1;
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(session = %id, item = %item.id, "session closing, alert skipped");
                }
            }
        }

        debug!(
            item = %item.id,
            delivered = outcome.delivered,
            failed = outcome.failed,
            "broadcast complete"
        );
        outcome
    }
}

/// Receiving half of a registered session
#[derive(Debug)]
pub struct Subscription {
    id: SessionId,
    generation: u64,
    receiver: mpsc::Receiver<Arc<CandidateItem>>,
    registry: Arc<ConnectionRegistry>,
}

impl Subscription {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Next alert for this session; `None` once the session was removed.
    pub async fn recv(&mut self) -> Option<Arc<CandidateItem>> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Arc<CandidateItem>> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.release(&self.id, self.generation);
    }
}
