//! Host collectors backed by `sysinfo`.

use resmon_addon::ResourceKind;
use resmon_core::{CollectionError, Collector, CollectorSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use sysinfo::{Disks, Networks, System, MINIMUM_CPU_UPDATE_INTERVAL};

/// One collector per resource kind, reading the local host.
///
/// The cpu collector averages usage over `refresh_interval` (never shorter
/// than what `sysinfo` can measure), so its producer does not sleep on top.
pub fn host_collectors(refresh_interval: Duration) -> CollectorSet {
    CollectorSet::new()
        .with(ResourceKind::Memory, MemoryCollector::new())
        .with(ResourceKind::Swap, SwapCollector::new())
        .with(ResourceKind::Cpu, CpuCollector::new(refresh_interval))
        .with(ResourceKind::Disk, DiskCollector)
        .with(ResourceKind::Network, NetworkCollector)
}

fn encode<T: Serialize>(snapshot: &T) -> Result<Value, CollectionError> {
    serde_json::to_value(snapshot).map_err(|e| CollectionError::Failed(e.to_string()))
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

fn lock(system: &Mutex<System>) -> MutexGuard<'_, System> {
    system.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Virtual memory, in bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySnapshot {
    pub total: u64,
    pub available: u64,
    pub used: u64,
    pub free: u64,
    pub percent: f64,
}

pub struct MemoryCollector {
    system: Mutex<System>,
}

impl MemoryCollector {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for MemoryCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for MemoryCollector {
    fn collect(&self) -> Result<Value, CollectionError> {
        let mut system = lock(&self.system);
        system.refresh_memory();

        let total = system.total_memory();
        if total == 0 {
            return Err(CollectionError::Unavailable(
                "memory totals not reported on this host".to_string(),
            ));
        }

        let available = system.available_memory();
        encode(&MemorySnapshot {
            total,
            available,
            used: system.used_memory(),
            free: system.free_memory(),
            percent: percent(total.saturating_sub(available), total),
        })
    }
}

/// Swap space, in bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapSnapshot {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub percent: f64,
}

pub struct SwapCollector {
    system: Mutex<System>,
}

impl SwapCollector {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SwapCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for SwapCollector {
    fn collect(&self) -> Result<Value, CollectionError> {
        let mut system = lock(&self.system);
        system.refresh_memory();

        // a host without swap reports zeros, which is a valid reading
        let total = system.total_swap();
        let used = system.used_swap();
        encode(&SwapSnapshot {
            total,
            used,
            free: system.free_swap(),
            percent: percent(used, total),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreUsage {
    pub name: String,
    pub usage: f32,
    pub frequency_mhz: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadAverage {
    pub one: f64,
    pub five: f64,
    pub fifteen: f64,
}

/// Processor usage averaged over the collector's window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuSnapshot {
    pub logical: usize,
    pub usage: f32,
    pub cores: Vec<CoreUsage>,
    pub load_average: LoadAverage,
}

pub struct CpuCollector {
    system: Mutex<System>,
    window: Duration,
}

impl CpuCollector {
    pub fn new(window: Duration) -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        Self {
            system: Mutex::new(system),
            window: window.max(MINIMUM_CPU_UPDATE_INTERVAL),
        }
    }

    /// How long one call measures for.
    pub fn window(&self) -> Duration {
        self.window
    }
}

impl Collector for CpuCollector {
    fn collect(&self) -> Result<Value, CollectionError> {
        let mut system = lock(&self.system);
        std::thread::sleep(self.window);
        system.refresh_cpu_all();

        let cpus = system.cpus();
        if cpus.is_empty() {
            return Err(CollectionError::Unavailable(
                "no processors reported on this host".to_string(),
            ));
        }

        let load = System::load_average();
        encode(&CpuSnapshot {
            logical: cpus.len(),
            usage: system.global_cpu_usage(),
            cores: cpus
                .iter()
                .map(|cpu| CoreUsage {
                    name: cpu.name().to_string(),
                    usage: cpu.cpu_usage(),
                    frequency_mhz: cpu.frequency(),
                })
                .collect(),
            load_average: LoadAverage {
                one: load.one,
                five: load.five,
                fifteen: load.fifteen,
            },
        })
    }

    fn paces_itself(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskUsage {
    pub name: String,
    pub mount_point: String,
    pub file_system: String,
    pub total: u64,
    pub available: u64,
    pub used: u64,
    pub percent: f64,
    pub removable: bool,
}

/// Space on every mounted file system, in bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskSnapshot {
    pub disks: Vec<DiskUsage>,
}

/// Lists mounts afresh on each call, so new and removed mounts show up.
pub struct DiskCollector;

impl Collector for DiskCollector {
    fn collect(&self) -> Result<Value, CollectionError> {
        let disks = Disks::new_with_refreshed_list();
        let disks = disks
            .list()
            .iter()
            .map(|disk| {
                let total = disk.total_space();
                let available = disk.available_space();
                let used = total.saturating_sub(available);
                DiskUsage {
                    name: disk.name().to_string_lossy().into_owned(),
                    mount_point: disk.mount_point().display().to_string(),
                    file_system: disk.file_system().to_string_lossy().into_owned(),
                    total,
                    available,
                    used,
                    percent: percent(used, total),
                    removable: disk.is_removable(),
                }
            })
            .collect();

        encode(&DiskSnapshot { disks })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterfaceCounters {
    pub bytes_received: u64,
    pub bytes_transmitted: u64,
    pub packets_received: u64,
    pub packets_transmitted: u64,
    pub errors_received: u64,
    pub errors_transmitted: u64,
}

impl InterfaceCounters {
    fn add(&mut self, other: &InterfaceCounters) {
        self.bytes_received += other.bytes_received;
        self.bytes_transmitted += other.bytes_transmitted;
        self.packets_received += other.packets_received;
        self.packets_transmitted += other.packets_transmitted;
        self.errors_received += other.errors_received;
        self.errors_transmitted += other.errors_transmitted;
    }
}

/// Cumulative interface counters since boot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub total: InterfaceCounters,
    pub interfaces: BTreeMap<String, InterfaceCounters>,
}

pub struct NetworkCollector;

impl Collector for NetworkCollector {
    fn collect(&self) -> Result<Value, CollectionError> {
        let networks = Networks::new_with_refreshed_list();
        let mut snapshot = NetworkSnapshot {
            total: InterfaceCounters::default(),
            interfaces: BTreeMap::new(),
        };

        for (name, data) in networks.list() {
            let counters = InterfaceCounters {
                bytes_received: data.total_received(),
                bytes_transmitted: data.total_transmitted(),
                packets_received: data.total_packets_received(),
                packets_transmitted: data.total_packets_transmitted(),
                errors_received: data.total_errors_on_received(),
                errors_transmitted: data.total_errors_on_transmitted(),
            };
            snapshot.total.add(&counters);
            snapshot.interfaces.insert(name.clone(), counters);
        }

        encode(&snapshot)
    }
}
