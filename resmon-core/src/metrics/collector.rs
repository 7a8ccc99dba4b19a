use crate::error::CollectionError;
use resmon_addon::ResourceKind;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Samples one resource kind.
///
/// Collectors are synchronous and run on the pipeline's worker pool, so they
/// may block briefly. The pipeline never calls the same collector twice at
/// once.
pub trait Collector: Send + Sync {
    fn collect(&self) -> Result<Value, CollectionError>;

    /// Whether a call already waits out the refresh interval (for example an
    /// interval-averaged CPU reading). The producer then skips its own sleep.
    fn paces_itself(&self) -> bool {
        false
    }
}

impl<F> Collector for F
where
    F: Fn() -> Result<Value, CollectionError> + Send + Sync,
{
    fn collect(&self) -> Result<Value, CollectionError> {
        self()
    }
}

/// Pin a closure to the collector signature, so its return type is inferred.
pub fn from_fn<F>(func: F) -> F
where
    F: Fn() -> Result<Value, CollectionError> + Send + Sync,
{
    func
}

/// The collectors a pipeline samples from, one per resource kind.
#[derive(Clone, Default)]
pub struct CollectorSet {
    collectors: HashMap<ResourceKind, Arc<dyn Collector>>,
}

impl CollectorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a collector, replacing any previous one for the same kind.
    pub fn insert<C: Collector + 'static>(&mut self, kind: ResourceKind, collector: C) -> &mut Self {
        self.collectors.insert(kind, Arc::new(collector));
        self
    }

    /// Builder-style [`CollectorSet::insert`].
    pub fn with<C: Collector + 'static>(mut self, kind: ResourceKind, collector: C) -> Self {
        self.insert(kind, collector);
        self
    }

    pub fn insert_shared(&mut self, kind: ResourceKind, collector: Arc<dyn Collector>) -> &mut Self {
        self.collectors.insert(kind, collector);
        self
    }

    pub fn get(&self, kind: ResourceKind) -> Option<&Arc<dyn Collector>> {
        self.collectors.get(&kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ResourceKind, &Arc<dyn Collector>)> + '_ {
        self.collectors.iter().map(|(kind, collector)| (*kind, collector))
    }

    /// Take every collector in `other`, replacing ours for the same kinds.
    pub fn extend(&mut self, other: CollectorSet) -> &mut Self {
        self.collectors.extend(other.collectors);
        self
    }

    pub fn contains(&self, kind: ResourceKind) -> bool {
        self.collectors.contains_key(&kind)
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }
}

impl fmt::Debug for CollectorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.collectors.keys().copied().collect();
        kinds.sort();
        f.debug_struct("CollectorSet").field("kinds", &kinds).finish()
    }
}
