use crate::error::{ConfigurationError, PipelineError};
use crate::metrics::panic_message;
use crate::options::PipelineOptions;
use crate::pipeline::channel::SnapshotChannel;
use crate::pipeline::faults::FaultLog;
use futures::FutureExt;
use resmon_addon::{
    AddonError, KindAddon, RecordStream, ResourceKind, SnapshotStream, UnifiedAddon,
};
use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Addons resolved against the monitored kinds.
#[derive(Clone)]
pub(crate) enum AddonBinding {
    Unified(Arc<dyn UnifiedAddon>),
    PerKind(BTreeMap<ResourceKind, Arc<dyn KindAddon>>),
}

impl AddonBinding {
    /// Match the registered addons to the options' mode and monitored kinds.
    pub fn resolve(options: &PipelineOptions) -> Result<Self, ConfigurationError> {
        let registry = &options.addons;

        if options.unified {
            let addon = registry
                .get_unified()
                .ok_or(ConfigurationError::ExpectedUnifiedAddon)?;
            check_name(addon.name())?;
            return Ok(Self::Unified(Arc::clone(addon)));
        }

        if registry.is_unified() || registry.is_empty() {
            return Err(ConfigurationError::ExpectedPerKindAddons);
        }

        for kind in registry.kinds() {
            if !options.monitoring.contains(&kind) {
                warn!(kind = %kind, "ignoring addon registered for unmonitored kind");
            }
        }

        let mut bound = BTreeMap::new();
        for &kind in &options.monitoring {
            let addon = registry
                .get(kind)
                .ok_or(ConfigurationError::MissingAddon(kind))?;
            check_name(addon.name())?;
            bound.insert(kind, Arc::clone(addon));
        }

        Ok(Self::PerKind(bound))
    }

    pub fn is_unified(&self) -> bool {
        matches!(self, Self::Unified(_))
    }

    /// Display names, `kind:name` for per-kind bindings.
    pub fn names(&self) -> Vec<String> {
        match self {
            Self::Unified(addon) => vec![addon.name().to_string()],
            Self::PerKind(addons) => addons
                .iter()
                .map(|(kind, addon)| format!("{}:{}", kind, addon.name()))
                .collect(),
        }
    }
}

fn check_name(name: &str) -> Result<(), ConfigurationError> {
    if name.trim().is_empty() {
        return Err(ConfigurationError::InvalidAddon(
            "addon name must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Run the unified addon on its stream as a task.
///
/// `channels` are closed once the addon returns, so their producers wind
/// down instead of queueing for nobody.
pub(crate) fn spawn_unified(
    addon: Arc<dyn UnifiedAddon>,
    stream: RecordStream,
    channels: Vec<Arc<SnapshotChannel>>,
    faults: Arc<FaultLog>,
) -> (String, JoinHandle<()>) {
    let name = addon.name().to_string();
    let handle = spawn_addon(name.clone(), channels, faults, async move {
        addon.process(stream).await
    });
    (name, handle)
}

/// Run a per-kind addon on that kind's stream as a task.
pub(crate) fn spawn_kind(
    kind: ResourceKind,
    addon: Arc<dyn KindAddon>,
    stream: SnapshotStream,
    channel: Arc<SnapshotChannel>,
    faults: Arc<FaultLog>,
) -> (String, JoinHandle<()>) {
    let name = format!("{}:{}", kind, addon.name());
    let handle = spawn_addon(name.clone(), vec![channel], faults, async move {
        addon.process(kind, stream).await
    });
    (name, handle)
}

fn spawn_addon<F>(
    name: String,
    channels: Vec<Arc<SnapshotChannel>>,
    faults: Arc<FaultLog>,
    run: F,
) -> JoinHandle<()>
where
    F: Future<Output = Result<(), AddonError>> + Send + 'static,
{
    tokio::spawn(async move {
        debug!(addon = %name, "addon started");
        match AssertUnwindSafe(run).catch_unwind().await {
            Ok(Ok(())) => info!(addon = %name, "addon finished"),
            Ok(Err(e)) => {
                error!(addon = %name, error = %e, "addon failed");
                faults.record(PipelineError::Addon {
                    addon: name.clone(),
                    source: e,
                });
            }
            Err(payload) => {
                let message = panic_message(payload);
                error!(addon = %name, panic = %message, "addon panicked");
                faults.record(PipelineError::AddonPanicked {
                    addon: name.clone(),
                    message,
                });
            }
        }

        for channel in &channels {
            channel.close();
        }
        debug!(addon = %name, channels = channels.len(), "addon channels closed");
    })
}
