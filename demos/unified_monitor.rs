//! Example: Joined host telemetry
//!
//! Samples memory, cpu and network together and prints the newest joined
//! record once a second.

use resmon::{host_collectors, LatestRecordAddon, Pipeline, PipelineOptions, ResourceKind};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!("resmon - Unified Monitor Example\n");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("resmon_core=debug".parse()?),
        )
        .init();

    let (latest, mut records) = LatestRecordAddon::new();
    let options = PipelineOptions::new()
        .with_monitoring(vec![ResourceKind::Memory, ResourceKind::Cpu, ResourceKind::Network])
        .with_refresh_interval(Duration::from_millis(500))
        .with_channel_capacity(4)
        .with_unified_addon(Arc::new(latest));
    let collectors = host_collectors(options.refresh_interval);

    let pipeline = Pipeline::new(options, collectors)?;
    pipeline.start().await;

    for _ in 0..5 {
        tokio::time::sleep(Duration::from_secs(1)).await;
        if records.has_changed()? {
            if let Some(record) = records.borrow_and_update().as_ref() {
                println!("round {}:", record.round());
                for (kind, snapshot) in record.iter() {
                    println!("  {:<8} {}", kind, snapshot.data());
                }
            }
        }
    }

    pipeline.stop().await?;
    println!("\nstats: {:#?}", pipeline.all_stats());
    Ok(())
}
