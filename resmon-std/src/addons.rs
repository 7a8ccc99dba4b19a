use async_trait::async_trait;
use futures::StreamExt;
use resmon_addon::{
    JoinedRecord, KindAddon, RecordStream, ResourceKind, Result, SnapshotStream, UnifiedAddon,
};
use tokio::sync::watch;
use tracing::{debug, info};

/// Logs every record or snapshot it receives.
///
/// Works in both modes: as the unified addon it logs one line per round, as a
/// per-kind addon one line per snapshot. Payloads are logged at debug level.
#[derive(Debug, Clone)]
pub struct TracingAddon {
    name: String,
}

impl TracingAddon {
    pub fn new() -> Self {
        Self::named("tracing")
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for TracingAddon {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UnifiedAddon for TracingAddon {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, mut item: RecordStream) -> Result<()> {
        let mut rounds = 0u64;
        while let Some(record) = item.next().await {
            info!(
                addon = %self.name,
                round = record.round(),
                kinds = ?record.kinds().collect::<Vec<_>>(),
                "record"
            );
            for (kind, snapshot) in record.iter() {
                debug!(addon = %self.name, kind = %kind, data = %snapshot.data(), "snapshot");
            }
            rounds += 1;
        }
        info!(addon = %self.name, rounds, "record stream ended");
        Ok(())
    }
}

#[async_trait]
impl KindAddon for TracingAddon {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, kind: ResourceKind, mut item: SnapshotStream) -> Result<()> {
        let mut count = 0u64;
        while let Some(snapshot) = item.next().await {
            info!(addon = %self.name, kind = %kind, sequence = snapshot.sequence(), "snapshot");
            debug!(addon = %self.name, kind = %kind, data = %snapshot.data(), "payload");
            count += 1;
        }
        info!(addon = %self.name, kind = %kind, count, "snapshot stream ended");
        Ok(())
    }
}

/// Publishes the newest joined record on a watch channel.
///
/// Readers always see the latest round and never slow the pipeline down.
#[derive(Debug)]
pub struct LatestRecordAddon {
    name: String,
    latest: watch::Sender<Option<JoinedRecord>>,
}

impl LatestRecordAddon {
    pub fn new() -> (Self, watch::Receiver<Option<JoinedRecord>>) {
        let (latest, receiver) = watch::channel(None);
        let addon = Self {
            name: "latest".to_string(),
            latest,
        };
        (addon, receiver)
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<JoinedRecord>> {
        self.latest.subscribe()
    }
}

#[async_trait]
impl UnifiedAddon for LatestRecordAddon {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, mut item: RecordStream) -> Result<()> {
        while let Some(record) = item.next().await {
            self.latest.send_replace(Some(record));
        }
        Ok(())
    }
}
