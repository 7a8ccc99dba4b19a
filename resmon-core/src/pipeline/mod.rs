//! The telemetry pipeline and its controller.
//!
//! The pipeline is organized into separate concerns:
//! - `channel`: per-kind bounded buffers with drop-oldest backpressure
//! - `producer`: one sampling task per monitored kind
//! - `consumer`: the unified and per-kind streams handed to addons
//! - `binding`: addon validation and the addon task runner
//! - `faults`: the bounded log of operational faults

mod binding;
mod channel;
mod consumer;
mod faults;
mod producer;

pub use channel::{PushOutcome, SnapshotChannel};
pub use faults::{Fault, FaultLog};

use crate::error::{ConfigurationError, PipelineError};
use crate::metrics::{Collector, CollectorSet, KindCounters, KindStats, WorkerPool};
use crate::options::PipelineOptions;
use binding::AddonBinding;
use producer::Producer;
use resmon_addon::{KindAddon, ResourceKind, UnifiedAddon};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Lifecycle state of a [`Pipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Idle,
    Running,
    Stopping,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineState::Idle => "idle",
            PipelineState::Running => "running",
            PipelineState::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Channel and counters of one kind for one run.
struct Slot {
    channel: Arc<SnapshotChannel>,
    counters: Arc<KindCounters>,
}

impl Slot {
    fn new(kind: ResourceKind, capacity: usize) -> Self {
        Self {
            channel: Arc::new(SnapshotChannel::new(kind, capacity)),
            counters: Arc::new(KindCounters::default()),
        }
    }

    fn stats(&self) -> KindStats {
        self.counters.snapshot(self.channel.stats())
    }
}

#[derive(Default)]
struct Slots {
    current: BTreeMap<ResourceKind, Slot>,
    last_run: BTreeMap<ResourceKind, KindStats>,
}

/// Tasks and tokens of a running pipeline.
struct Run {
    producer_cancel: CancellationToken,
    consumer_cancel: CancellationToken,
    producers: Vec<(ResourceKind, JoinHandle<()>)>,
    processors: Vec<(String, JoinHandle<()>)>,
}

/// Controller for a telemetry pipeline.
///
/// Owns one producer per monitored kind, the channels between producers
/// and addons, and the addon task(s). Construction validates everything
/// up front so that `start` cannot fail:
///
/// ```no_run
/// # async fn run() -> Result<(), resmon_core::PipelineError> {
/// use futures::StreamExt;
/// use resmon_core::{from_fn, unified_fn, CollectorSet, Pipeline, PipelineOptions, ResourceKind};
///
/// let options = PipelineOptions::new()
///     .with_monitoring(vec![ResourceKind::Memory])
///     .with_unified_addon(unified_fn("print", |mut records| async move {
///         while let Some(record) = records.next().await {
///             println!("{:?}", record);
///         }
///         Ok::<(), resmon_core::AddonError>(())
///     }));
/// let collectors = CollectorSet::new()
///     .with(ResourceKind::Memory, from_fn(|| Ok(serde_json::json!({ "used": 1 }))));
///
/// let pipeline = Pipeline::new(options, collectors)?;
/// pipeline.start().await;
/// pipeline.stop().await?;
/// # Ok(())
/// # }
/// ```
///
/// All lifecycle calls are serialized; `start` while running and `stop`
/// while idle are no-ops. Dropping the controller cancels and aborts every
/// task it spawned.
pub struct Pipeline {
    options: PipelineOptions,
    binding: AddonBinding,
    collectors: BTreeMap<ResourceKind, Arc<dyn Collector>>,
    pool: WorkerPool,
    /// One permit per kind, held by a collection until it returns.
    in_flight: BTreeMap<ResourceKind, Arc<Semaphore>>,
    faults: Arc<FaultLog>,
    state: watch::Sender<PipelineState>,
    slots: Mutex<Slots>,
    run: tokio::sync::Mutex<Option<Run>>,
}

impl Pipeline {
    /// Validate `options` against `collectors` and the registered addons.
    ///
    /// Collectors for kinds that are not monitored are ignored.
    pub fn new(options: PipelineOptions, collectors: CollectorSet) -> Result<Self, ConfigurationError> {
        options.validate()?;

        let mut bound = BTreeMap::new();
        for &kind in &options.monitoring {
            let collector = collectors
                .get(kind)
                .ok_or(ConfigurationError::MissingCollector(kind))?;
            bound.insert(kind, Arc::clone(collector));
        }

        let binding = AddonBinding::resolve(&options)?;
        let pool = WorkerPool::new(options.worker_pool_size);
        let in_flight = bound
            .keys()
            .map(|&kind| (kind, Arc::new(Semaphore::new(1))))
            .collect();
        let slots = Slots {
            current: fresh_slots(&options),
            last_run: BTreeMap::new(),
        };
        let (state, _) = watch::channel(PipelineState::Idle);

        debug!(
            monitoring = ?options.monitoring,
            unified = options.unified,
            addons = ?binding.names(),
            "pipeline configured"
        );

        Ok(Self {
            options,
            binding,
            collectors: bound,
            pool,
            in_flight,
            faults: Arc::new(FaultLog::new()),
            state,
            slots: Mutex::new(slots),
            run: tokio::sync::Mutex::new(None),
        })
    }

    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    /// Start sampling. Returns `false` if the pipeline was not idle.
    ///
    /// Addon tasks are spawned before any producer so nothing is pushed
    /// into a channel nobody reads.
    pub async fn start(&self) -> bool {
        let mut run = self.run.lock().await;
        if run.is_some() {
            debug!("start ignored, pipeline already running");
            return false;
        }

        let producer_cancel = CancellationToken::new();
        let consumer_cancel = CancellationToken::new();
        let slots: Vec<(ResourceKind, Arc<SnapshotChannel>, Arc<KindCounters>)> = {
            let mut slots = self.lock_slots();
            slots.last_run.clear();
            slots
                .current
                .iter()
                .map(|(kind, slot)| (*kind, Arc::clone(&slot.channel), Arc::clone(&slot.counters)))
                .collect()
        };

        let processors = match &self.binding {
            AddonBinding::Unified(addon) => {
                let channels = slots.iter().map(|(_, channel, _)| Arc::clone(channel)).collect();
                let stream = consumer::unified_stream(
                    channels,
                    self.options.join_timeout,
                    consumer_cancel.clone(),
                    Arc::clone(&self.faults),
                );
                let channels = slots.iter().map(|(_, channel, _)| Arc::clone(channel)).collect();
                vec![binding::spawn_unified(
                    Arc::clone(addon),
                    stream,
                    channels,
                    Arc::clone(&self.faults),
                )]
            }
            AddonBinding::PerKind(addons) => slots
                .iter()
                .filter_map(|(kind, channel, _)| {
                    let addon = addons.get(kind)?;
                    let stream = consumer::kind_stream(Arc::clone(channel), consumer_cancel.clone());
                    Some(binding::spawn_kind(
                        *kind,
                        Arc::clone(addon),
                        stream,
                        Arc::clone(channel),
                        Arc::clone(&self.faults),
                    ))
                })
                .collect(),
        };

        let mut producers = Vec::with_capacity(slots.len());
        for (kind, channel, counters) in slots {
            let (Some(collector), Some(in_flight)) =
                (self.collectors.get(&kind), self.in_flight.get(&kind))
            else {
                continue;
            };
            let producer = Producer {
                kind,
                collector: Arc::clone(collector),
                pool: self.pool.clone(),
                in_flight: Arc::clone(in_flight),
                channel,
                counters,
                faults: Arc::clone(&self.faults),
                interval: self.options.refresh_interval,
            };
            producers.push((kind, producer.spawn(producer_cancel.clone())));
        }

        info!(
            producers = producers.len(),
            addons = processors.len(),
            interval = ?self.options.refresh_interval,
            "pipeline started"
        );

        *run = Some(Run {
            producer_cancel,
            consumer_cancel,
            producers,
            processors,
        });
        self.state.send_replace(PipelineState::Running);
        true
    }

    /// Stop sampling and tear the run down.
    ///
    /// Producers are cancelled and awaited first, then the addons. Tasks
    /// that miss their deadline are aborted; teardown completes regardless
    /// and the pipeline ends idle and restartable. Missed deadlines are
    /// returned as [`PipelineError::ShutdownTimeout`].
    pub async fn stop(&self) -> Result<(), PipelineError> {
        let mut guard = self.run.lock().await;
        let Some(run) = guard.take() else {
            debug!("stop ignored, pipeline not running");
            return Ok(());
        };
        self.state.send_replace(PipelineState::Stopping);
        info!("pipeline stopping");

        run.producer_cancel.cancel();
        let leaked_producers =
            join_within(run.producers, self.options.producer_shutdown_timeout).await;
        for kind in &leaked_producers {
            error!(kind = %kind, timeout = ?self.options.producer_shutdown_timeout, "producer leaked, aborted");
        }

        run.consumer_cancel.cancel();
        let blocked_addons =
            join_within(run.processors, self.options.addon_shutdown_timeout).await;
        for addon in &blocked_addons {
            error!(addon = %addon, timeout = ?self.options.addon_shutdown_timeout, "processor blocked on return, aborted");
        }

        self.recycle();
        self.state.send_replace(PipelineState::Idle);

        if leaked_producers.is_empty() && blocked_addons.is_empty() {
            info!("pipeline stopped");
            return Ok(());
        }

        let error = PipelineError::ShutdownTimeout {
            leaked_producers,
            blocked_addons,
        };
        warn!(error = %error, "pipeline stopped with leaked tasks");
        self.faults.record(error.clone());
        Err(error)
    }

    /// Close this run's channels and replace them with empty ones.
    fn recycle(&self) {
        let mut slots = self.lock_slots();
        let finished = std::mem::replace(&mut slots.current, fresh_slots(&self.options));
        slots.last_run = finished
            .into_iter()
            .map(|(kind, slot)| {
                slot.channel.close();
                (kind, slot.stats())
            })
            .collect();
    }

    fn lock_slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.state() == PipelineState::Running
    }

    /// Counters for `kind` in the current run, or in the last finished run
    /// while idle.
    pub fn stats(&self, kind: ResourceKind) -> Option<KindStats> {
        let slots = self.lock_slots();
        if let Some(stats) = slots.last_run.get(&kind) {
            return Some(stats.clone());
        }
        slots.current.get(&kind).map(Slot::stats)
    }

    /// [`stats`](Self::stats) for every monitored kind.
    pub fn all_stats(&self) -> BTreeMap<ResourceKind, KindStats> {
        self.options
            .monitoring
            .iter()
            .filter_map(|&kind| self.stats(kind).map(|stats| (kind, stats)))
            .collect()
    }

    /// Recent faults, oldest first.
    pub fn faults(&self) -> Vec<Fault> {
        self.faults.all()
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn monitoring(&self) -> &BTreeSet<ResourceKind> {
        &self.options.monitoring
    }

    pub fn is_unified(&self) -> bool {
        self.binding.is_unified()
    }

    pub fn addon_names(&self) -> Vec<String> {
        self.binding.names()
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Some(run) = self.run.get_mut().take() {
            run.producer_cancel.cancel();
            run.consumer_cancel.cancel();
            for (_, handle) in run.producers {
                handle.abort();
            }
            for (_, handle) in run.processors {
                handle.abort();
            }
        }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("state", &self.state())
            .field("monitoring", &self.options.monitoring)
            .field("addons", &self.binding.names())
            .finish()
    }
}

fn fresh_slots(options: &PipelineOptions) -> BTreeMap<ResourceKind, Slot> {
    options
        .monitoring
        .iter()
        .map(|&kind| (kind, Slot::new(kind, options.channel_capacity)))
        .collect()
}

/// Stands in for deadlines too far out for `Instant`, about thirty years.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// The instant `timeout` from now, saturating instead of overflowing.
pub(crate) fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE)
}

/// Await `tasks` against one shared deadline; return the keys of those
/// that missed it, after aborting them.
async fn join_within<K: fmt::Display>(tasks: Vec<(K, JoinHandle<()>)>, timeout: Duration) -> Vec<K> {
    let deadline = deadline_after(timeout);
    let mut late = Vec::new();

    for (key, mut handle) in tasks {
        match tokio::time::timeout_at(deadline, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.is_panic() => error!(task = %key, "task panicked"),
            Ok(Err(_)) => debug!(task = %key, "task cancelled"),
            Err(_) => {
                handle.abort();
                late.push(key);
            }
        }
    }

    late
}

/// Builder for [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    options: PipelineOptions,
    collectors: CollectorSet,
}

impl PipelineBuilder {
    pub fn options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn monitor(mut self, kinds: impl IntoIterator<Item = ResourceKind>) -> Self {
        self.options = self.options.with_monitoring(kinds);
        self
    }

    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.options = self.options.with_refresh_interval(interval);
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.options = self.options.with_channel_capacity(capacity);
        self
    }

    pub fn worker_pool_size(mut self, size: usize) -> Self {
        self.options = self.options.with_worker_pool_size(size);
        self
    }

    pub fn join_timeout(mut self, timeout: Duration) -> Self {
        self.options = self.options.with_join_timeout(timeout);
        self
    }

    pub fn shutdown_timeouts(mut self, producers: Duration, addons: Duration) -> Self {
        self.options = self.options.with_shutdown_timeouts(producers, addons);
        self
    }

    pub fn collector<C: Collector + 'static>(mut self, kind: ResourceKind, collector: C) -> Self {
        self.collectors.insert(kind, collector);
        self
    }

    /// Add every collector in `collectors`, replacing existing ones.
    pub fn collectors(mut self, collectors: CollectorSet) -> Self {
        self.collectors.extend(collectors);
        self
    }

    pub fn unified_addon(mut self, addon: Arc<dyn UnifiedAddon>) -> Self {
        self.options = self.options.with_unified_addon(addon);
        self
    }

    pub fn kind_addon(mut self, kind: ResourceKind, addon: Arc<dyn KindAddon>) -> Self {
        self.options = self.options.with_kind_addon(kind, addon);
        self
    }

    pub fn build(self) -> Result<Pipeline, ConfigurationError> {
        Pipeline::new(self.options, self.collectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CollectionError;
    use crate::metrics::from_fn;
    use futures::StreamExt;
    use resmon_addon::{kind_fn, unified_fn, AddonError, RecordStream, SnapshotStream};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn constant(value: u64) -> impl Collector {
        from_fn(move || Ok(json!({ "value": value })))
    }

    fn failing() -> impl Collector {
        from_fn(|| Err(CollectionError::Unavailable("no mounts".into())))
    }

    /// Unified addon counting records, asserting each holds `expected` kinds.
    fn counting_addon(
        records_seen: Arc<AtomicUsize>,
        expected: Vec<ResourceKind>,
    ) -> Arc<dyn UnifiedAddon> {
        unified_fn("counter", move |mut records: RecordStream| {
            let records_seen = Arc::clone(&records_seen);
            let expected = expected.clone();
            async move {
                while let Some(record) = records.next().await {
                    assert_eq!(record.kinds().collect::<Vec<_>>(), expected);
                    records_seen.fetch_add(1, Ordering::SeqCst);
                }
                Ok::<(), AddonError>(())
            }
        })
    }

    fn counting_kind_addon(counts: Arc<Mutex<BTreeMap<ResourceKind, usize>>>) -> Arc<dyn KindAddon> {
        kind_fn("counter", move |kind, mut snapshots: SnapshotStream| {
            let counts = Arc::clone(&counts);
            async move {
                while let Some(snapshot) = snapshots.next().await {
                    assert_eq!(snapshot.kind(), kind);
                    *counts.lock().unwrap().entry(kind).or_default() += 1;
                }
                Ok::<(), AddonError>(())
            }
        })
    }

    fn cpu_memory(records_seen: &Arc<AtomicUsize>) -> PipelineBuilder {
        Pipeline::builder()
            .monitor(vec![ResourceKind::Cpu, ResourceKind::Memory])
            .refresh_interval(Duration::from_millis(10))
            .channel_capacity(4)
            .collector(ResourceKind::Cpu, constant(1))
            .collector(ResourceKind::Memory, constant(2))
            .unified_addon(counting_addon(
                Arc::clone(records_seen),
                vec![ResourceKind::Memory, ResourceKind::Cpu],
            ))
    }

    #[tokio::test]
    async fn test_start_then_stop_ends_idle() {
        let seen = Arc::new(AtomicUsize::new(0));
        let pipeline = cpu_memory(&seen).build().unwrap();
        assert_eq!(pipeline.state(), PipelineState::Idle);

        assert!(pipeline.start().await);
        assert_eq!(pipeline.state(), PipelineState::Running);

        tokio::time::timeout(Duration::from_secs(15), pipeline.stop())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pipeline.state(), PipelineState::Idle);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_unified_records_hold_every_monitored_kind() {
        let seen = Arc::new(AtomicUsize::new(0));
        let pipeline = cpu_memory(&seen).build().unwrap();

        pipeline.start().await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        pipeline.stop().await.unwrap();

        let total = seen.load(Ordering::SeqCst);
        assert!(total >= 50, "only {} records in one second", total);

        // producers are gone: nothing moves after stop
        let collected = pipeline.stats(ResourceKind::Cpu).unwrap().collected;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(seen.load(Ordering::SeqCst), total);
        assert_eq!(pipeline.stats(ResourceKind::Cpu).unwrap().collected, collected);
        assert!(pipeline.faults().is_empty());
    }

    #[tokio::test]
    async fn test_double_start_runs_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let addon = {
            let runs = Arc::clone(&runs);
            unified_fn("runs", move |mut records: RecordStream| {
                let runs = Arc::clone(&runs);
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    while records.next().await.is_some() {}
                    Ok::<(), AddonError>(())
                }
            })
        };
        let pipeline = Pipeline::builder()
            .monitor(vec![ResourceKind::Memory])
            .refresh_interval(Duration::from_millis(10))
            .collector(ResourceKind::Memory, constant(0))
            .unified_addon(addon)
            .build()
            .unwrap();

        assert!(pipeline.start().await);
        assert!(!pipeline.start().await);
        tokio::time::sleep(Duration::from_millis(50)).await;
        pipeline.stop().await.unwrap();
        pipeline.stop().await.unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(pipeline.state(), PipelineState::Idle);
    }

    #[test]
    fn test_missing_kind_addon_fails_at_construction() {
        let counts = Arc::new(Mutex::new(BTreeMap::new()));
        let result = Pipeline::builder()
            .monitor(vec![ResourceKind::Cpu, ResourceKind::Disk])
            .collector(ResourceKind::Cpu, constant(0))
            .collector(ResourceKind::Disk, constant(0))
            .kind_addon(ResourceKind::Cpu, counting_kind_addon(counts))
            .build();

        assert_eq!(
            result.err(),
            Some(ConfigurationError::MissingAddon(ResourceKind::Disk))
        );
    }

    #[test]
    fn test_missing_collector_fails_at_construction() {
        let seen = Arc::new(AtomicUsize::new(0));
        let result = Pipeline::builder()
            .monitor(vec![ResourceKind::Swap])
            .unified_addon(counting_addon(seen, vec![ResourceKind::Swap]))
            .build();

        assert_eq!(
            result.err(),
            Some(ConfigurationError::MissingCollector(ResourceKind::Swap))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failing_kind_is_isolated() {
        let counts = Arc::new(Mutex::new(BTreeMap::new()));
        let addon = counting_kind_addon(Arc::clone(&counts));
        let mut options = PipelineOptions::new()
            .with_monitoring(vec![ResourceKind::Cpu, ResourceKind::Memory, ResourceKind::Disk])
            .with_refresh_interval(Duration::from_millis(10))
            .with_unified(false);
        options
            .addons
            .register_all(options.monitoring.clone(), addon);
        let collectors = CollectorSet::new()
            .with(ResourceKind::Cpu, constant(1))
            .with(ResourceKind::Memory, constant(2))
            .with(ResourceKind::Disk, failing());

        let pipeline = Pipeline::new(options, collectors).unwrap();
        pipeline.start().await;
        tokio::time::sleep(Duration::from_millis(300)).await;
        pipeline.stop().await.unwrap();

        let counts = counts.lock().unwrap().clone();
        assert!(counts.get(&ResourceKind::Cpu).copied().unwrap_or(0) > 0);
        assert!(counts.get(&ResourceKind::Memory).copied().unwrap_or(0) > 0);
        assert!(!counts.contains_key(&ResourceKind::Disk));

        let disk = pipeline.stats(ResourceKind::Disk).unwrap();
        assert!(disk.failed > 0);
        assert_eq!(disk.collected, 0);
        assert!(!disk.is_healthy());
        assert!(pipeline.stats(ResourceKind::Cpu).unwrap().is_healthy());

        let faults = pipeline.faults();
        assert!(!faults.is_empty());
        assert!(faults.iter().all(|f| f.kind == Some(ResourceKind::Disk)));
    }

    #[tokio::test]
    async fn test_restart_begins_with_fresh_streams() {
        let rounds = Arc::new(Mutex::new(Vec::new()));
        let addon = {
            let rounds = Arc::clone(&rounds);
            unified_fn("rounds", move |mut records: RecordStream| {
                let rounds = Arc::clone(&rounds);
                async move {
                    if let Some(record) = records.next().await {
                        rounds.lock().unwrap().push(record.round());
                    }
                    while records.next().await.is_some() {}
                    Ok::<(), AddonError>(())
                }
            })
        };
        let pipeline = Pipeline::builder()
            .monitor(vec![ResourceKind::Memory])
            .refresh_interval(Duration::from_millis(5))
            .collector(ResourceKind::Memory, constant(0))
            .unified_addon(addon)
            .build()
            .unwrap();

        for _ in 0..2 {
            assert!(pipeline.start().await);
            tokio::time::sleep(Duration::from_millis(60)).await;
            pipeline.stop().await.unwrap();
            assert_eq!(pipeline.state(), PipelineState::Idle);
        }

        assert_eq!(*rounds.lock().unwrap(), vec![0, 0]);
    }

    #[tokio::test]
    async fn test_blocked_addon_reports_shutdown_timeout() {
        let addon = unified_fn("stuck", |_records: RecordStream| async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok::<(), AddonError>(())
        });
        let pipeline = Pipeline::builder()
            .monitor(vec![ResourceKind::Memory])
            .refresh_interval(Duration::from_millis(10))
            .shutdown_timeouts(Duration::from_secs(1), Duration::from_millis(100))
            .collector(ResourceKind::Memory, constant(0))
            .unified_addon(addon)
            .build()
            .unwrap();

        pipeline.start().await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        match pipeline.stop().await {
            Err(PipelineError::ShutdownTimeout {
                leaked_producers,
                blocked_addons,
            }) => {
                assert!(leaked_producers.is_empty());
                assert_eq!(blocked_addons, vec!["stuck".to_string()]);
            }
            other => panic!("unexpected stop result: {:?}", other),
        }
        assert_eq!(pipeline.state(), PipelineState::Idle);
        assert!(pipeline
            .faults()
            .iter()
            .any(|f| matches!(f.error, PipelineError::ShutdownTimeout { .. })));

        assert!(pipeline.start().await);
        assert_eq!(pipeline.state(), PipelineState::Running);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stuck_collector_is_reported_as_leak() {
        let seen = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::builder()
            .monitor(vec![ResourceKind::Network])
            .shutdown_timeouts(Duration::from_millis(50), Duration::from_secs(1))
            .collector(
                ResourceKind::Network,
                from_fn(|| {
                    std::thread::sleep(Duration::from_millis(400));
                    Ok(json!(null))
                }),
            )
            .unified_addon(counting_addon(seen, vec![ResourceKind::Network]))
            .build()
            .unwrap();

        pipeline.start().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        match pipeline.stop().await {
            Err(PipelineError::ShutdownTimeout {
                leaked_producers, ..
            }) => assert_eq!(leaked_producers, vec![ResourceKind::Network]),
            other => panic!("unexpected stop result: {:?}", other),
        }
        assert_eq!(pipeline.state(), PipelineState::Idle);
    }

    #[tokio::test]
    async fn test_join_timeout_ends_unified_stream() {
        let finished = Arc::new(AtomicUsize::new(0));
        let addon = {
            let finished = Arc::clone(&finished);
            unified_fn("join", move |mut records: RecordStream| {
                let finished = Arc::clone(&finished);
                async move {
                    while records.next().await.is_some() {}
                    finished.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), AddonError>(())
                }
            })
        };
        let pipeline = Pipeline::builder()
            .monitor(vec![ResourceKind::Cpu, ResourceKind::Disk])
            .refresh_interval(Duration::from_millis(10))
            .join_timeout(Duration::from_millis(100))
            .collector(ResourceKind::Cpu, constant(1))
            .collector(ResourceKind::Disk, failing())
            .unified_addon(addon)
            .build()
            .unwrap();

        pipeline.start().await;
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        pipeline.stop().await.unwrap();

        let timeouts: Vec<_> = pipeline
            .faults()
            .into_iter()
            .filter_map(|f| match f.error {
                PipelineError::BackpressureTimeout { missing, .. } => Some(missing),
                _ => None,
            })
            .collect();
        assert_eq!(timeouts, vec![vec![ResourceKind::Disk]]);
    }

    #[tokio::test]
    async fn test_subscribers_observe_transitions() {
        let seen = Arc::new(AtomicUsize::new(0));
        let pipeline = cpu_memory(&seen).build().unwrap();
        let mut states = pipeline.subscribe();
        assert_eq!(*states.borrow(), PipelineState::Idle);

        pipeline.start().await;
        states.changed().await.unwrap();
        assert_eq!(*states.borrow_and_update(), PipelineState::Running);

        pipeline.stop().await.unwrap();
        assert_eq!(*states.borrow_and_update(), PipelineState::Idle);
    }

    #[tokio::test]
    async fn test_drop_cancels_running_tasks() {
        let seen = Arc::new(AtomicUsize::new(0));
        let pipeline = cpu_memory(&seen).build().unwrap();
        pipeline.start().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(pipeline);

        let after_drop = seen.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(seen.load(Ordering::SeqCst), after_drop);
    }

    #[tokio::test]
    async fn test_huge_timeouts_do_not_overflow() {
        let seen = Arc::new(AtomicUsize::new(0));
        let options = PipelineOptions::from_yaml(
            "monitoring: [memory]\n\
             refresh_interval: 0.005\n\
             join_timeout: 1e300\n\
             producer_shutdown_timeout: 1e300\n\
             addon_shutdown_timeout: 1e300\n",
        )
        .unwrap();
        assert_eq!(options.join_timeout, Duration::MAX);
        assert_eq!(options.producer_shutdown_timeout, Duration::MAX);

        let options =
            options.with_unified_addon(counting_addon(Arc::clone(&seen), vec![ResourceKind::Memory]));
        let collectors = CollectorSet::new().with(ResourceKind::Memory, constant(0));
        let pipeline = Pipeline::new(options, collectors).unwrap();

        pipeline.start().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(pipeline.state(), PipelineState::Running);
        pipeline.stop().await.unwrap();

        assert!(seen.load(Ordering::SeqCst) > 0);
        assert!(pipeline.faults().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_restart_waits_for_orphaned_collection() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let collector = {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            from_fn(move || {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(400));
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(json!(null))
            })
        };
        let seen = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::builder()
            .monitor(vec![ResourceKind::Network])
            .refresh_interval(Duration::from_millis(10))
            .shutdown_timeouts(Duration::from_millis(50), Duration::from_secs(1))
            .collector(ResourceKind::Network, collector)
            .unified_addon(counting_addon(seen, vec![ResourceKind::Network]))
            .build()
            .unwrap();

        pipeline.start().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(pipeline.stop().await.is_err());

        assert!(pipeline.start().await);
        tokio::time::sleep(Duration::from_millis(600)).await;
        let _ = pipeline.stop().await;

        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_join_timeout_stops_producers() {
        let seen = Arc::new(AtomicUsize::new(0));
        let pipeline = Pipeline::builder()
            .monitor(vec![ResourceKind::Cpu, ResourceKind::Disk])
            .refresh_interval(Duration::from_millis(1))
            .join_timeout(Duration::from_millis(50))
            .collector(ResourceKind::Cpu, constant(1))
            .collector(ResourceKind::Disk, failing())
            .unified_addon(counting_addon(seen, vec![ResourceKind::Cpu, ResourceKind::Disk]))
            .build()
            .unwrap();
        assert_eq!(pipeline.options().channel_capacity, 0);

        pipeline.start().await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        let settled = pipeline.stats(ResourceKind::Cpu).unwrap().channel;
        tokio::time::sleep(Duration::from_millis(100)).await;
        let later = pipeline.stats(ResourceKind::Cpu).unwrap().channel;

        assert_eq!(later.pushed, settled.pushed);
        assert_eq!(later.depth, settled.depth);
        assert_eq!(pipeline.state(), PipelineState::Running);
        pipeline.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_early_kind_addon_return_stops_its_producer() {
        let addon = kind_fn("first-only", |_kind, mut snapshots: SnapshotStream| async move {
            let _ = snapshots.next().await;
            Ok::<(), AddonError>(())
        });
        let pipeline = Pipeline::builder()
            .monitor(vec![ResourceKind::Memory])
            .refresh_interval(Duration::from_millis(1))
            .collector(ResourceKind::Memory, constant(0))
            .kind_addon(ResourceKind::Memory, addon)
            .build()
            .unwrap();

        pipeline.start().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        let settled = pipeline.stats(ResourceKind::Memory).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let later = pipeline.stats(ResourceKind::Memory).unwrap();

        assert!(settled.collected > 0);
        assert_eq!(later.collected, settled.collected);
        pipeline.stop().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_start_and_stop() {
        let runs = Arc::new(AtomicUsize::new(0));
        let addon = {
            let runs = Arc::clone(&runs);
            unified_fn("runs", move |mut records: RecordStream| {
                let runs = Arc::clone(&runs);
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    while records.next().await.is_some() {}
                    Ok::<(), AddonError>(())
                }
            })
        };
        let pipeline = Arc::new(
            Pipeline::builder()
                .monitor(vec![ResourceKind::Memory, ResourceKind::Swap])
                .refresh_interval(Duration::from_millis(5))
                .collector(ResourceKind::Memory, constant(0))
                .collector(ResourceKind::Swap, constant(1))
                .unified_addon(addon)
                .build()
                .unwrap(),
        );

        let starts = futures::future::join_all((0..8).map(|_| {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move { pipeline.start().await })
        }))
        .await;
        let started = starts.into_iter().filter(|s| *s.as_ref().unwrap()).count();
        assert_eq!(started, 1);
        assert_eq!(pipeline.state(), PipelineState::Running);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let stops = futures::future::join_all((0..8).map(|_| {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move { pipeline.stop().await })
        }))
        .await;
        for stopped in stops {
            stopped.unwrap().unwrap();
        }

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(pipeline.state(), PipelineState::Idle);
    }
}
