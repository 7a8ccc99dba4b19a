use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use resmon_core::{KindStats, Pipeline, PipelineOptions, ResourceKind};
use resmon_std::{host_collectors, TracingAddon};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Stream host resource telemetry to the log.
#[derive(Parser, Debug)]
#[command(name = "resmon", version, about)]
struct Args {
    /// Options file (YAML). Defaults to ./resmon.yaml when present
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Resource kinds to monitor, repeated or comma-separated
    #[arg(long, short, value_delimiter = ',')]
    monitor: Vec<ResourceKind>,

    /// Seconds between samples
    #[arg(long, short)]
    interval: Option<f64>,

    /// Run one addon per kind instead of the joined stream
    #[arg(long)]
    per_kind: bool,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long, short)]
    duration: Option<f64>,

    /// Print the JSON schema of the options file and exit
    #[arg(long)]
    print_schema: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_schema {
        let schema = schemars::schema_for!(PipelineOptions);
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("resmon_core=info,resmon_std=info,resmon=info")),
        )
        .init();

    let options = build_options(&args)?;
    let collectors = host_collectors(options.refresh_interval);
    let pipeline = Pipeline::new(options, collectors).context("Invalid pipeline options")?;

    println!(
        "{} monitoring [{}] every {:?} ({} mode)",
        "resmon".bold(),
        pipeline
            .monitoring()
            .iter()
            .map(ResourceKind::as_str)
            .collect::<Vec<_>>()
            .join(", "),
        pipeline.options().refresh_interval,
        if pipeline.is_unified() { "unified" } else { "per-kind" },
    );

    tracing::info!(
        config = ?args.config,
        duration = ?args.duration,
        addons = ?pipeline.addon_names(),
        "Starting resmon"
    );
    pipeline.start().await;
    wait_for_shutdown(args.duration).await?;
    let stopped = pipeline.stop().await;

    print_summary(&pipeline);
    if let Err(e) = stopped {
        eprintln!("{} {}", "warning:".yellow().bold(), e);
    }

    Ok(())
}

fn build_options(args: &Args) -> Result<PipelineOptions> {
    let mut options = match &args.config {
        Some(path) => PipelineOptions::load(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => PipelineOptions::load_or_default(),
    };

    if !args.monitor.is_empty() {
        options = options.with_monitoring(args.monitor.iter().copied());
    }
    if let Some(secs) = args.interval {
        options = options.with_refresh_interval_secs(secs);
    }
    if args.per_kind {
        options.unified = false;
    }

    let addon = Arc::new(TracingAddon::new());
    if options.unified {
        options = options.with_unified_addon(addon);
    } else {
        let kinds = options.monitoring.clone();
        options.addons.register_all(kinds, addon);
    }

    Ok(options)
}

async fn wait_for_shutdown(duration: Option<f64>) -> Result<()> {
    let Some(secs) = duration else {
        tokio::signal::ctrl_c().await?;
        return Ok(());
    };

    let limit = Duration::try_from_secs_f64(secs.max(0.0)).context("Invalid --duration")?;
    tokio::select! {
        signal = tokio::signal::ctrl_c() => signal?,
        _ = tokio::time::sleep(limit) => {}
    }
    Ok(())
}

fn print_summary(pipeline: &Pipeline) {
    println!("\n{}", "Summary".bold().underline());
    for (kind, stats) in pipeline.all_stats() {
        println!("{}", summary_line(kind, &stats));
    }

    let faults = pipeline.faults();
    if !faults.is_empty() {
        println!("{} {} fault(s) recorded", "!".red().bold(), faults.len());
    }
}

fn summary_line(kind: ResourceKind, stats: &KindStats) -> String {
    let failed = if stats.failed > 0 {
        stats.failed.to_string().red().to_string()
    } else {
        stats.failed.to_string()
    };

    let mut line = format!(
        "  {:<8} collected {} failed {} evicted {} delivered {}",
        kind.as_str().bold(),
        stats.collected.to_string().green(),
        failed,
        stats.channel.evicted,
        stats.channel.delivered,
    );
    if let Some(error) = &stats.last_error {
        line.push_str(&format!("  {}", error.dimmed()));
    }
    line
}
