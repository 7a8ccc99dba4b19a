//! resmon-addon - Addon contract for the resmon telemetry pipeline
//!
//! Addons are the caller-supplied routines that consume live telemetry:
//! - `UnifiedAddon` receives one stream of joined records covering every monitored kind
//! - `KindAddon` receives the stream of a single resource kind
//!
//! Both are async traits, so an addon that blocks the scheduler or takes the
//! wrong input simply does not compile. The closure adapters in [`unified_fn`]
//! and [`kind_fn`] cover the common case of a single async function.

mod func;
mod registry;
mod types;

use async_trait::async_trait;
use thiserror::Error;

pub use func::{kind_fn, unified_fn, KindFn, UnifiedFn};
pub use registry::AddonRegistry;
pub use types::{JoinedRecord, RecordStream, ResourceKind, Snapshot, SnapshotStream, UnknownKind};

#[derive(Debug, Clone, Error)]
pub enum AddonError {
    #[error("Addon failed: {0}")]
    Failed(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, AddonError>;

/// Processes the unified stream: one record per round, each holding a
/// snapshot of every monitored kind.
///
/// `process` is called once per pipeline run and should return once the
/// stream ends, which happens when the pipeline stops.
#[async_trait]
pub trait UnifiedAddon: Send + Sync {
    fn name(&self) -> &str;

    async fn process(&self, item: RecordStream) -> Result<()>;
}

/// Processes the snapshots of one resource kind.
///
/// The same addon may be registered for several kinds; it is then run once
/// per kind with that kind's stream.
#[async_trait]
pub trait KindAddon: Send + Sync {
    fn name(&self) -> &str;

    async fn process(&self, kind: ResourceKind, item: SnapshotStream) -> Result<()>;
}
