use crate::error::PipelineError;
use crate::metrics::{Collector, KindCounters, WorkerPool};
use crate::pipeline::channel::{PushOutcome, SnapshotChannel};
use crate::pipeline::faults::FaultLog;
use resmon_addon::{ResourceKind, Snapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Samples one resource kind into its channel until cancelled.
pub(crate) struct Producer {
    pub kind: ResourceKind,
    pub collector: Arc<dyn Collector>,
    pub pool: WorkerPool,
    /// Shared across runs, so a restarted producer waits out an orphaned call.
    pub in_flight: Arc<Semaphore>,
    pub channel: Arc<SnapshotChannel>,
    pub counters: Arc<KindCounters>,
    pub faults: Arc<FaultLog>,
    pub interval: Duration,
}

impl Producer {
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    /// `sample -> enqueue -> sleep` until the token is cancelled or the
    /// channel is closed.
    ///
    /// Each collection holds the kind's in-flight permit until the collector
    /// returns, even when this task is aborted, so a kind never has two
    /// collections running. A result is discarded if cancellation arrived
    /// meanwhile.
    async fn run(self, cancel: CancellationToken) {
        let paced = self.collector.paces_itself();
        let mut sequence = 0u64;
        debug!(kind = %self.kind, interval = ?self.interval, paced, "producer started");

        loop {
            if cancel.is_cancelled() || self.channel.is_closed() {
                break;
            }

            let slot = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                slot = Arc::clone(&self.in_flight).acquire_owned() => slot,
            };
            let Ok(slot) = slot else {
                break;
            };

            let result = self
                .pool
                .collect_holding(Arc::clone(&self.collector), slot)
                .await;
            if cancel.is_cancelled() {
                break;
            }

            let mut wait = !paced;
            match result {
                Ok(data) => {
                    self.counters.record_success();
                    let outcome = self.channel.push(Snapshot::new(self.kind, sequence, data));
                    sequence += 1;
                    if outcome == PushOutcome::Closed {
                        debug!(kind = %self.kind, "channel closed under producer");
                        break;
                    }
                }
                Err(e) => {
                    warn!(kind = %self.kind, error = %e, "collection failed, retrying next interval");
                    self.counters.record_failure(e.to_string());
                    self.faults.record(PipelineError::Collection {
                        kind: self.kind,
                        source: e,
                    });
                    // a paced collector that fails fast would otherwise spin
                    wait = true;
                }
            }

            if wait {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.interval) => {}
                }
            } else {
                tokio::task::yield_now().await;
            }
        }

        debug!(kind = %self.kind, produced = sequence, "producer stopped");
    }
}
