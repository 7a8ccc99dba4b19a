//! Error types for the telemetry pipeline.
//!
//! Each failure class has its own variant so that operators can tell a
//! metric that is temporarily unavailable apart from a task that leaked.

use resmon_addon::{AddonError, ResourceKind};
use std::time::Duration;
use thiserror::Error;

/// A pipeline could not be built from the given options.
///
/// Always raised by `Pipeline::new`, never by `start`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("At least one resource kind must be monitored")]
    EmptyMonitoring,

    #[error("No collector registered for monitored kind {0}")]
    MissingCollector(ResourceKind),

    #[error("Unified mode requires a single unified addon")]
    ExpectedUnifiedAddon,

    #[error("Per-kind mode requires one addon per monitored kind, found a unified addon")]
    ExpectedPerKindAddons,

    #[error("No addon registered for monitored kind {0}")]
    MissingAddon(ResourceKind),

    #[error("Invalid addon: {0}")]
    InvalidAddon(String),

    #[error("{name} must be greater than zero")]
    ZeroTimeout { name: &'static str },
}

/// A single collector call failed.
#[derive(Debug, Clone, Error)]
pub enum CollectionError {
    #[error("Collection failed: {0}")]
    Failed(String),

    #[error("Resource unavailable: {0}")]
    Unavailable(String),

    #[error("Collector panicked: {0}")]
    Panicked(String),
}

#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Collecting {kind} failed: {source}")]
    Collection {
        kind: ResourceKind,
        #[source]
        source: CollectionError,
    },

    #[error("No fresh snapshot from {} within {waited:?}", join_kinds(missing))]
    BackpressureTimeout {
        waited: Duration,
        missing: Vec<ResourceKind>,
    },

    #[error(
        "Shutdown timed out (leaked producers: [{}], processors blocked on return: [{}])",
        join_kinds(leaked_producers),
        blocked_addons.join(", ")
    )]
    ShutdownTimeout {
        leaked_producers: Vec<ResourceKind>,
        blocked_addons: Vec<String>,
    },

    #[error("Addon {addon} failed: {source}")]
    Addon {
        addon: String,
        #[source]
        source: AddonError,
    },

    #[error("Addon {addon} panicked: {message}")]
    AddonPanicked { addon: String, message: String },
}

impl PipelineError {
    /// The resource kind this error is scoped to, if it is scoped to one.
    pub fn kind(&self) -> Option<ResourceKind> {
        match self {
            PipelineError::Collection { kind, .. } => Some(*kind),
            PipelineError::Configuration(ConfigurationError::MissingCollector(kind))
            | PipelineError::Configuration(ConfigurationError::MissingAddon(kind)) => Some(*kind),
            _ => None,
        }
    }
}

fn join_kinds(kinds: &[ResourceKind]) -> String {
    kinds
        .iter()
        .map(|k| k.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, PipelineError>;
