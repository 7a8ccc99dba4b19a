use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

/// One monitored OS subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Memory,
    Swap,
    Cpu,
    Disk,
    Network,
}

impl ResourceKind {
    /// Every kind the pipeline knows how to sample.
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Memory,
        ResourceKind::Swap,
        ResourceKind::Cpu,
        ResourceKind::Disk,
        ResourceKind::Network,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Memory => "memory",
            ResourceKind::Swap => "swap",
            ResourceKind::Cpu => "cpu",
            ResourceKind::Disk => "disk",
            ResourceKind::Network => "network",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a known resource kind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown resource kind: {0}")]
pub struct UnknownKind(pub String);

impl FromStr for ResourceKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ResourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

/// One sampled measurement for a resource kind.
///
/// The payload is whatever the collector returned; the pipeline never
/// looks inside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    kind: ResourceKind,
    sequence: u64,
    taken_at: SystemTime,
    data: Value,
}

impl Snapshot {
    pub fn new(kind: ResourceKind, sequence: u64, data: Value) -> Self {
        Self {
            kind,
            sequence,
            taken_at: SystemTime::now(),
            data,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Position of this sample within its producer run, starting at 0.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn taken_at(&self) -> SystemTime {
        self.taken_at
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    pub fn into_data(self) -> Value {
        self.data
    }
}

/// One snapshot per monitored kind, gathered in the same unified round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinedRecord {
    round: u64,
    snapshots: BTreeMap<ResourceKind, Snapshot>,
}

impl JoinedRecord {
    pub fn new(round: u64, snapshots: BTreeMap<ResourceKind, Snapshot>) -> Self {
        Self { round, snapshots }
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn get(&self, kind: ResourceKind) -> Option<&Snapshot> {
        self.snapshots.get(&kind)
    }

    pub fn contains(&self, kind: ResourceKind) -> bool {
        self.snapshots.contains_key(&kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = ResourceKind> + '_ {
        self.snapshots.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ResourceKind, &Snapshot)> {
        self.snapshots.iter()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn into_snapshots(self) -> BTreeMap<ResourceKind, Snapshot> {
        self.snapshots
    }
}

/// Live snapshots of a single kind, in the order they were produced.
pub type SnapshotStream = BoxStream<'static, Snapshot>;

/// Live joined records, one per unified round.
pub type RecordStream = BoxStream<'static, JoinedRecord>;
