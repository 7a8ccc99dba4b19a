//! Per-kind snapshot channel.
//!
//! Backpressure is drop-oldest for every kind: pushing into a full channel
//! evicts the oldest queued snapshot and never blocks the producer. A
//! capacity of zero means the channel is unbounded and never evicts.

use crate::metrics::ChannelStats;
use resmon_addon::{ResourceKind, Snapshot};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;
use tracing::debug;

/// Result of a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queued after evicting the oldest snapshot.
    Evicted,
    /// The channel was closed; the snapshot was dropped.
    Closed,
}

#[derive(Debug, Default)]
struct ChannelState {
    queue: VecDeque<Snapshot>,
    closed: bool,
}

#[derive(Debug)]
pub struct SnapshotChannel {
    kind: ResourceKind,
    capacity: usize,
    state: Mutex<ChannelState>,
    notify: Notify,
    pushed: AtomicU64,
    evicted: AtomicU64,
    delivered: AtomicU64,
}

impl SnapshotChannel {
    pub fn new(kind: ResourceKind, capacity: usize) -> Self {
        Self {
            kind,
            capacity,
            state: Mutex::new(ChannelState::default()),
            notify: Notify::new(),
            pushed: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Maximum queued snapshots, or `None` when unbounded.
    pub fn capacity(&self) -> Option<usize> {
        (self.capacity > 0).then_some(self.capacity)
    }

    fn lock(&self) -> MutexGuard<'_, ChannelState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Enqueue a snapshot, evicting the oldest one if the channel is full.
    pub fn push(&self, snapshot: Snapshot) -> PushOutcome {
        let outcome = {
            let mut state = self.lock();
            if state.closed {
                return PushOutcome::Closed;
            }

            let mut outcome = PushOutcome::Queued;
            if self.capacity > 0 && state.queue.len() >= self.capacity {
                if let Some(stale) = state.queue.pop_front() {
                    self.evicted.fetch_add(1, Ordering::Relaxed);
                    debug!(kind = %self.kind, sequence = stale.sequence(), "evicted stale snapshot");
                }
                outcome = PushOutcome::Evicted;
            }
            state.queue.push_back(snapshot);
            self.pushed.fetch_add(1, Ordering::Relaxed);
            outcome
        };

        self.notify.notify_waiters();
        outcome
    }

    /// Take the oldest snapshot without waiting.
    pub fn try_recv(&self) -> Option<Snapshot> {
        let snapshot = self.lock().queue.pop_front();
        if snapshot.is_some() {
            self.delivered.fetch_add(1, Ordering::Relaxed);
        }
        snapshot
    }

    /// Wait for the oldest snapshot.
    ///
    /// Returns `None` once the channel is closed and drained. Cancel-safe:
    /// dropping the future never loses a snapshot.
    pub async fn recv(&self) -> Option<Snapshot> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(snapshot) = state.queue.pop_front() {
                    self.delivered.fetch_add(1, Ordering::Relaxed);
                    return Some(snapshot);
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Refuse further pushes and wake any waiting consumer.
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> ChannelStats {
        let depth = self.len();
        ChannelStats {
            pushed: self.pushed.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            depth,
        }
    }
}
