use crate::{KindAddon, ResourceKind, UnifiedAddon};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Registry for the addons bound to a pipeline.
///
/// The registry holds either:
/// - a single unified addon that consumes the joined stream
/// - one addon per resource kind, each consuming that kind's stream
///
/// Registering one shape replaces the other. Whether the shape matches the
/// pipeline's options is checked when the pipeline is built.
#[derive(Clone, Default)]
pub struct AddonRegistry {
    unified: Option<Arc<dyn UnifiedAddon>>,
    per_kind: BTreeMap<ResourceKind, Arc<dyn KindAddon>>,
}

impl AddonRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding a single unified addon.
    pub fn with_unified(addon: Arc<dyn UnifiedAddon>) -> Self {
        let mut registry = Self::new();
        registry.unified(addon);
        registry
    }

    /// Bind the unified addon, dropping any per-kind addons.
    pub fn unified(&mut self, addon: Arc<dyn UnifiedAddon>) -> &mut Self {
        self.per_kind.clear();
        self.unified = Some(addon);
        self
    }

    /// Bind an addon to one resource kind, dropping any unified addon.
    /// Returns the addon previously bound to that kind, if any.
    pub fn register(
        &mut self,
        kind: ResourceKind,
        addon: Arc<dyn KindAddon>,
    ) -> Option<Arc<dyn KindAddon>> {
        self.unified = None;
        self.per_kind.insert(kind, addon)
    }

    /// Bind the same addon to every kind in `kinds`.
    pub fn register_all(
        &mut self,
        kinds: impl IntoIterator<Item = ResourceKind>,
        addon: Arc<dyn KindAddon>,
    ) -> &mut Self {
        for kind in kinds {
            self.register(kind, Arc::clone(&addon));
        }
        self
    }

    pub fn is_unified(&self) -> bool {
        self.unified.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.unified.is_none() && self.per_kind.is_empty()
    }

    /// Number of registered bindings.
    pub fn len(&self) -> usize {
        if self.unified.is_some() {
            1
        } else {
            self.per_kind.len()
        }
    }

    pub fn get_unified(&self) -> Option<&Arc<dyn UnifiedAddon>> {
        self.unified.as_ref()
    }

    /// Get the addon bound to a kind.
    pub fn get(&self, kind: ResourceKind) -> Option<&Arc<dyn KindAddon>> {
        self.per_kind.get(&kind)
    }

    /// Kinds with a per-kind addon bound, in kind order.
    pub fn kinds(&self) -> impl Iterator<Item = ResourceKind> + '_ {
        self.per_kind.keys().copied()
    }

    /// Names of all registered addons, one entry per binding.
    pub fn names(&self) -> Vec<String> {
        match &self.unified {
            Some(addon) => vec![addon.name().to_string()],
            None => self
                .per_kind
                .iter()
                .map(|(kind, addon)| format!("{}:{}", kind, addon.name()))
                .collect(),
        }
    }
}

impl fmt::Debug for AddonRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddonRegistry")
            .field("unified", &self.unified.as_ref().map(|a| a.name().to_string()))
            .field(
                "per_kind",
                &self
                    .per_kind
                    .iter()
                    .map(|(kind, addon)| (*kind, addon.name().to_string()))
                    .collect::<BTreeMap<_, _>>(),
            )
            .finish()
    }
}
