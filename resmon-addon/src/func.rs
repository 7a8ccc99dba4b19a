//! Closure-backed addons.

use crate::{KindAddon, RecordStream, ResourceKind, Result, SnapshotStream, UnifiedAddon};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;

/// A unified addon backed by an async function.
pub struct UnifiedFn<F> {
    name: String,
    func: F,
}

#[async_trait]
impl<F, Fut> UnifiedAddon for UnifiedFn<F>
where
    F: Fn(RecordStream) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, item: RecordStream) -> Result<()> {
        (self.func)(item).await
    }
}

/// A per-kind addon backed by an async function.
pub struct KindFn<F> {
    name: String,
    func: F,
}

#[async_trait]
impl<F, Fut> KindAddon for KindFn<F>
where
    F: Fn(ResourceKind, SnapshotStream) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, kind: ResourceKind, item: SnapshotStream) -> Result<()> {
        (self.func)(kind, item).await
    }
}

/// Wrap an async function taking the record stream as a unified addon.
///
/// # Example
/// ```
/// use futures::StreamExt;
/// use resmon_addon::{unified_fn, UnifiedAddon};
///
/// let addon = unified_fn("count", |mut item| async move {
///     let mut rounds = 0;
///     while item.next().await.is_some() {
///         rounds += 1;
///     }
///     println!("saw {} rounds", rounds);
///     Ok::<(), resmon_addon::AddonError>(())
/// });
/// assert_eq!(addon.name(), "count");
/// ```
pub fn unified_fn<F, Fut>(name: impl Into<String>, func: F) -> Arc<dyn UnifiedAddon>
where
    F: Fn(RecordStream) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(UnifiedFn {
        name: name.into(),
        func,
    })
}

/// Wrap an async function taking a kind and its snapshot stream as a per-kind addon.
pub fn kind_fn<F, Fut>(name: impl Into<String>, func: F) -> Arc<dyn KindAddon>
where
    F: Fn(ResourceKind, SnapshotStream) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(KindFn {
        name: name.into(),
        func,
    })
}
