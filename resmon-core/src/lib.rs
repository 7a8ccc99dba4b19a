//! resmon-core - Resource telemetry pipeline
//!
//! Samples OS resource metrics on a fixed interval and streams them to
//! caller-supplied addons:
//! - Collectors and the worker pool they run on (`metrics`)
//! - Bounded per-kind channels with drop-oldest backpressure
//! - Unified (joined) or per-kind consumer streams
//! - A controller with a two-phase, bounded graceful shutdown
//! - YAML-loadable options (`options`)
//!
//! ## Primary API
//!
//! Build a [`Pipeline`] from [`PipelineOptions`] and a [`CollectorSet`],
//! then drive it with `start` and `stop`.

pub mod error;
pub mod metrics;
pub mod options;
pub mod pipeline;

pub use error::{CollectionError, ConfigurationError, PipelineError};
pub use metrics::{from_fn, ChannelStats, Collector, CollectorSet, KindStats, WorkerPool};
pub use options::{ConfigError, PipelineOptions};
pub use pipeline::{Fault, Pipeline, PipelineBuilder, PipelineState};

pub use resmon_addon::{
    kind_fn, unified_fn, AddonError, AddonRegistry, JoinedRecord, KindAddon, RecordStream,
    ResourceKind, Snapshot, SnapshotStream, UnifiedAddon,
};
