//! Example: One addon per resource kind
//!
//! Memory and swap get a closure addon that prints usage; disk is logged
//! through the tracing addon.

use futures::StreamExt;
use resmon::{
    host_collectors, kind_fn, AddonError, Pipeline, PipelineOptions, ResourceKind, SnapshotStream,
    TracingAddon,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!("resmon - Per-Kind Monitor Example\n");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("resmon_std=info".parse()?),
        )
        .init();

    let usage = kind_fn("usage", |kind, mut snapshots: SnapshotStream| async move {
        while let Some(snapshot) = snapshots.next().await {
            let percent = snapshot.data()["percent"].as_f64().unwrap_or_default();
            println!("{:<6} #{:<3} {:>5.1}%", kind, snapshot.sequence(), percent);
        }
        Ok::<(), AddonError>(())
    });

    let options = PipelineOptions::new()
        .with_monitoring(vec![ResourceKind::Memory, ResourceKind::Swap, ResourceKind::Disk])
        .with_refresh_interval_secs(0.5)
        .with_kind_addon(ResourceKind::Memory, Arc::clone(&usage))
        .with_kind_addon(ResourceKind::Swap, usage)
        .with_kind_addon(ResourceKind::Disk, Arc::new(TracingAddon::named("disk-log")));
    let collectors = host_collectors(options.refresh_interval);

    let pipeline = Pipeline::new(options, collectors)?;
    pipeline.start().await;
    tokio::time::sleep(Duration::from_secs(3)).await;
    pipeline.stop().await?;

    for (kind, stats) in pipeline.all_stats() {
        println!("{}: {} collected, {} failed", kind, stats.collected, stats.failed);
    }
    Ok(())
}
