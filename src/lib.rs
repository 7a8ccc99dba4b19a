//! resmon - Host resource telemetry pipeline
//!
//! Re-exports the pipeline from `resmon-core`, the addon contract from
//! `resmon-addon` and, with the default `std` feature, the host collectors
//! and stock addons from `resmon-std`.
//!
//! ```no_run
//! use resmon::{host_collectors, Pipeline, PipelineOptions, TracingAddon};
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let options = PipelineOptions::load_or_default().with_unified_addon(Arc::new(TracingAddon::new()));
//! let collectors = host_collectors(options.refresh_interval);
//! let pipeline = Pipeline::new(options, collectors)?;
//!
//! pipeline.start().await;
//! tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//! pipeline.stop().await?;
//! # Ok(())
//! # }
//! ```

pub use resmon_addon as addon;
pub use resmon_core::*;

#[cfg(feature = "std")]
pub use resmon_std::*;
