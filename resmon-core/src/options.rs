use resmon_addon::{AddonRegistry, KindAddon, ResourceKind, UnifiedAddon};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::error::ConfigurationError;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration for a telemetry pipeline.
///
/// Numeric inputs are normalized as they come in: negative intervals and
/// capacities clamp to zero, and a worker pool never has fewer than one
/// thread. A `channel_capacity` of zero means the channels are unbounded.
///
/// Addons cannot come from a file, so they are skipped by serde and must be
/// attached in code with [`PipelineOptions::with_addons`] or one of the
/// `with_*_addon` helpers.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PipelineOptions {
    /// Resource kinds to sample.
    #[schemars(with = "BTreeSet<String>")]
    pub monitoring: BTreeSet<ResourceKind>,

    /// Join every kind into one stream (`true`) or hand each kind its own stream (`false`).
    pub unified: bool,

    /// Pause between two samples of the same kind, in seconds.
    #[serde(with = "secs")]
    #[schemars(with = "f64")]
    pub refresh_interval: Duration,

    /// Maximum queued snapshots per kind before the oldest is dropped. 0 = unbounded.
    #[serde(deserialize_with = "non_negative")]
    #[schemars(with = "i64")]
    pub channel_capacity: usize,

    /// Threads available for running collectors.
    #[serde(deserialize_with = "at_least_one")]
    #[schemars(with = "i64")]
    pub worker_pool_size: usize,

    /// How long a unified round may wait for its slowest kind, in seconds.
    #[serde(with = "secs")]
    #[schemars(with = "f64")]
    pub join_timeout: Duration,

    /// Bound on waiting for producers during stop, in seconds.
    #[serde(with = "secs")]
    #[schemars(with = "f64")]
    pub producer_shutdown_timeout: Duration,

    /// Bound on waiting for addons during stop, in seconds.
    #[serde(with = "secs")]
    #[schemars(with = "f64")]
    pub addon_shutdown_timeout: Duration,

    #[serde(skip)]
    pub addons: AddonRegistry,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            monitoring: ResourceKind::ALL.into_iter().collect(),
            unified: true,
            refresh_interval: Duration::from_secs(1),
            channel_capacity: 0,
            worker_pool_size: 10,
            join_timeout: Duration::from_secs(10),
            producer_shutdown_timeout: Duration::from_secs(10),
            addon_shutdown_timeout: Duration::from_secs(5),
            addons: AddonRegistry::default(),
        }
    }
}

impl PipelineOptions {
    /// Create options with default values and builder-style configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load options from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Parse options from a YAML document.
    pub fn from_yaml(contents: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Load options from `resmon.yaml` if it exists, otherwise use defaults.
    pub fn load_or_default() -> Self {
        Self::load("resmon.yaml").unwrap_or_default()
    }

    /// Set the monitored resource kinds.
    pub fn with_monitoring(mut self, kinds: impl IntoIterator<Item = ResourceKind>) -> Self {
        self.monitoring = kinds.into_iter().collect();
        self
    }

    /// Select unified or per-kind consumption.
    pub fn with_unified(mut self, unified: bool) -> Self {
        self.unified = unified;
        self
    }

    /// Set the refresh interval.
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Set the refresh interval in seconds. Negative values clamp to zero.
    pub fn with_refresh_interval_secs(mut self, secs: f64) -> Self {
        self.refresh_interval = duration_from_secs(secs);
        self
    }

    /// Set the per-kind channel capacity (0 = unbounded).
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    /// Set the worker pool size. Zero clamps to one.
    pub fn with_worker_pool_size(mut self, size: usize) -> Self {
        self.worker_pool_size = size.max(1);
        self
    }

    /// Set the unified join timeout.
    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    /// Set both shutdown bounds.
    pub fn with_shutdown_timeouts(mut self, producers: Duration, addons: Duration) -> Self {
        self.producer_shutdown_timeout = producers;
        self.addon_shutdown_timeout = addons;
        self
    }

    /// Attach a prepared addon registry.
    pub fn with_addons(mut self, addons: AddonRegistry) -> Self {
        self.addons = addons;
        self
    }

    /// Attach a unified addon and switch to unified mode.
    pub fn with_unified_addon(mut self, addon: Arc<dyn UnifiedAddon>) -> Self {
        self.addons.unified(addon);
        self.unified = true;
        self
    }

    /// Bind an addon to one kind and switch to per-kind mode.
    pub fn with_kind_addon(mut self, kind: ResourceKind, addon: Arc<dyn KindAddon>) -> Self {
        self.addons.register(kind, addon);
        self.unified = false;
        self
    }

    /// Check the parts of the options that do not depend on addons or collectors.
    pub fn validate(&self) -> std::result::Result<(), ConfigurationError> {
        if self.monitoring.is_empty() {
            return Err(ConfigurationError::EmptyMonitoring);
        }

        for (name, timeout) in [
            ("join_timeout", self.join_timeout),
            ("producer_shutdown_timeout", self.producer_shutdown_timeout),
            ("addon_shutdown_timeout", self.addon_shutdown_timeout),
        ] {
            if timeout.is_zero() {
                return Err(ConfigurationError::ZeroTimeout { name });
            }
        }

        Ok(())
    }
}

fn duration_from_secs(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        Duration::ZERO
    } else {
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

fn non_negative<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<usize, D::Error> {
    let value = i64::deserialize(deserializer)?;
    Ok(usize::try_from(value.max(0)).unwrap_or(usize::MAX))
}

fn at_least_one<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<usize, D::Error> {
    let value = i64::deserialize(deserializer)?;
    Ok(usize::try_from(value.max(1)).unwrap_or(usize::MAX))
}

/// Durations as (possibly fractional) seconds.
mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Ok(super::duration_from_secs(secs))
    }
}
