//! Consumer bindings: the streams addons read from.

use crate::error::PipelineError;
use crate::pipeline::channel::SnapshotChannel;
use crate::pipeline::deadline_after;
use crate::pipeline::faults::FaultLog;
use futures::stream::{self, FuturesUnordered, StreamExt};
use resmon_addon::{JoinedRecord, RecordStream, ResourceKind, Snapshot, SnapshotStream};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Stream of one kind's snapshots, ending when `cancel` fires or the channel
/// closes.
pub(crate) fn kind_stream(channel: Arc<SnapshotChannel>, cancel: CancellationToken) -> SnapshotStream {
    stream::unfold((channel, cancel), |(channel, cancel)| async move {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            snapshot = channel.recv() => snapshot,
        };
        next.map(|snapshot| (snapshot, (channel, cancel)))
    })
    .boxed()
}

struct JoinState {
    channels: Vec<Arc<SnapshotChannel>>,
    join_timeout: Duration,
    cancel: CancellationToken,
    faults: Arc<FaultLog>,
    round: u64,
}

impl JoinState {
    fn close_all(&self) {
        for channel in &self.channels {
            channel.close();
        }
    }
}

enum Round {
    Joined(BTreeMap<ResourceKind, Snapshot>),
    Cancelled,
    Closed(ResourceKind),
    TimedOut(Vec<ResourceKind>),
}

/// Stream of joined records, one per round across all `channels`.
///
/// A round that cannot be completed within `join_timeout` ends the stream
/// for good; the timeout is logged and recorded as a fault. A stream that
/// ends on its own closes every channel, so producers stop feeding it.
pub(crate) fn unified_stream(
    channels: Vec<Arc<SnapshotChannel>>,
    join_timeout: Duration,
    cancel: CancellationToken,
    faults: Arc<FaultLog>,
) -> RecordStream {
    let state = JoinState {
        channels,
        join_timeout,
        cancel,
        faults,
        round: 0,
    };

    stream::unfold(state, |mut state| async move {
        let round = gather(&state.channels, state.join_timeout, &state.cancel).await;
        match round {
            Round::Joined(snapshots) => {
                let record = JoinedRecord::new(state.round, snapshots);
                state.round += 1;
                Some((record, state))
            }
            Round::Cancelled => {
                debug!(rounds = state.round, "unified stream cancelled");
                None
            }
            Round::Closed(kind) => {
                debug!(kind = %kind, rounds = state.round, "unified stream ended on closed channel");
                state.close_all();
                None
            }
            Round::TimedOut(missing) => {
                let error = PipelineError::BackpressureTimeout {
                    waited: state.join_timeout,
                    missing,
                };
                warn!(error = %error, rounds = state.round, "unified stream terminated, restart the pipeline to resume");
                state.faults.record(error);
                state.close_all();
                None
            }
        }
    })
    .boxed()
}

/// Wait for one snapshot from every channel, concurrently.
///
/// A round that ends early drops the snapshots it already took. Those still
/// count as delivered in the channel stats.
async fn gather(
    channels: &[Arc<SnapshotChannel>],
    join_timeout: Duration,
    cancel: &CancellationToken,
) -> Round {
    let deadline = deadline_after(join_timeout);
    let mut pending: FuturesUnordered<_> = channels
        .iter()
        .map(|channel| async move { (channel.kind(), channel.recv().await) })
        .collect();
    let mut joined = BTreeMap::new();

    while !pending.is_empty() {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Round::Cancelled,
            Some((kind, snapshot)) = pending.next() => match snapshot {
                Some(snapshot) => {
                    joined.insert(kind, snapshot);
                }
                None => return Round::Closed(kind),
            },
            _ = tokio::time::sleep_until(deadline) => {
                let missing = channels
                    .iter()
                    .map(|channel| channel.kind())
                    .filter(|kind| !joined.contains_key(kind))
                    .collect();
                return Round::TimedOut(missing);
            }
        }
    }

    Round::Joined(joined)
}
