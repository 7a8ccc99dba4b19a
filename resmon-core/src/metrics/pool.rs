use crate::error::CollectionError;
use crate::metrics::collector::Collector;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounded pool of blocking threads that run collectors.
///
/// At most `size` collectors run at the same time; further calls wait for a
/// permit. The permit travels with the blocking job, so it is only released
/// once the collector actually returns.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Permits not currently held by a running collector.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run one collection on the pool.
    pub async fn collect(&self, collector: Arc<dyn Collector>) -> Result<Value, CollectionError> {
        self.run(collector, None).await
    }

    /// Like [`collect`](Self::collect), but `held` moves into the blocking
    /// job and is released only when the collector returns, even if the
    /// caller was dropped or aborted before then.
    pub async fn collect_holding(
        &self,
        collector: Arc<dyn Collector>,
        held: OwnedSemaphorePermit,
    ) -> Result<Value, CollectionError> {
        self.run(collector, Some(held)).await
    }

    async fn run(
        &self,
        collector: Arc<dyn Collector>,
        held: Option<OwnedSemaphorePermit>,
    ) -> Result<Value, CollectionError> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| CollectionError::Failed(format!("worker pool closed: {}", e)))?;

        let job = tokio::task::spawn_blocking(move || {
            let _permits = (permit, held);
            collector.collect()
        });

        match job.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(CollectionError::Panicked(panic_message(e.into_panic()))),
            Err(e) => Err(CollectionError::Failed(e.to_string())),
        }
    }
}

pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
