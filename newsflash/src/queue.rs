use common::OverflowPolicy;
use std::collections::VecDeque;

use crate::item::CandidateItem;

/// Result of pushing onto a full bounded queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enqueued {
    Accepted,
    /// Accepted after evicting the oldest entry
    EvictedOldest(CandidateItem),
    /// Rejected the incoming item
    RejectedNewest(CandidateItem),
}

/// FIFO of qualifying items waiting for a subscriber.
///
/// Not synchronized on its own; the dispatcher owns it behind a lock so the
/// broadcast-or-enqueue decision and the push happen under one guard.
#[derive(Debug, Default)]
pub struct DeliveryQueue {
    items: VecDeque<CandidateItem>,
    max_len: Option<usize>,
    overflow: OverflowPolicy,
}

impl DeliveryQueue {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn bounded(max_len: usize, overflow: OverflowPolicy) -> Self {
        Self {
            items: VecDeque::with_capacity(max_len),
            max_len: Some(max_len),
            overflow,
        }
    }

    /// Append to the tail, applying the overflow policy when bounded.
    pub fn enqueue(&mut self, item: CandidateItem) -> Enqueued {
        match self.max_len {
            Some(max) if self.items.len() >= max => match self.overflow {
                OverflowPolicy::DropOldest => {
                    let evicted = self.items.pop_front();
                    self.items.push_back(item);
                    match evicted {
                        Some(old) => Enqueued::EvictedOldest(old),
                        None => Enqueued::Accepted,
                    }
                }
                OverflowPolicy::DropNewest => Enqueued::RejectedNewest(item),
            },
            _ => {
                self.items.push_back(item);
                Enqueued::Accepted
            }
        }
    }

    /// Remove and return every queued item in FIFO order.
    pub fn drain_all(&mut self) -> Vec<CandidateItem> {
        self.items.drain(..).collect()
    }

    /// Put previously drained items back ahead of anything queued since,
    /// keeping their relative order. Ignores the bound.
    pub fn requeue_front(&mut self, items: Vec<CandidateItem>) {
        for item in items.into_iter().rev() {
            self.items.push_front(item);
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
