//! Standard collectors and addons for resmon
//!
//! The standard library covers what most deployments need out of the box:
//! - Host collectors for memory, swap, cpu, disk and network (via `sysinfo`)
//! - A logging addon that writes every record through `tracing`
//! - A latest-record addon that publishes the newest record on a watch channel

mod addons;
mod collectors;

pub use addons::{LatestRecordAddon, TracingAddon};
pub use collectors::{
    host_collectors, CoreUsage, CpuCollector, CpuSnapshot, DiskCollector, DiskSnapshot, DiskUsage,
    InterfaceCounters, LoadAverage, MemoryCollector, MemorySnapshot, NetworkCollector,
    NetworkSnapshot, SwapCollector, SwapSnapshot,
};
