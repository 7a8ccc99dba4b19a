use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Traffic through one kind's channel during the current run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub pushed: u64,
    pub evicted: u64,
    pub delivered: u64,
    pub depth: usize,
}

/// Point-in-time view of one resource kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KindStats {
    /// Successful collections during the run.
    pub collected: u64,
    /// Failed collections during the run.
    pub failed: u64,
    /// Failures since the last successful collection.
    pub consecutive_failures: u64,
    pub last_error: Option<String>,
    pub channel: ChannelStats,
}

impl KindStats {
    pub fn is_healthy(&self) -> bool {
        self.consecutive_failures == 0
    }
}

/// Collection outcomes for one kind in one run, shared between its producer
/// and the pipeline.
#[derive(Debug, Default)]
pub struct KindCounters {
    collected: AtomicU64,
    failed: AtomicU64,
    consecutive_failures: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl KindCounters {
    pub fn record_success(&self) {
        self.collected.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    pub fn record_failure(&self, error: impl Into<String>) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        let mut last = self
            .last_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *last = Some(error.into());
    }

    pub fn snapshot(&self, channel: ChannelStats) -> KindStats {
        let last_error = self
            .last_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        KindStats {
            collected: self.collected.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            consecutive_failures: self.consecutive_failures.load(Ordering::Relaxed),
            last_error,
            channel,
        }
    }
}
