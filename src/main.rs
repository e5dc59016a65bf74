//! # Sensor Pipeline Entry Point
//!
//! Runs one pipeline pass: a synthetic sensor feeds a range filter, a
//! Celsius→Fahrenheit transform and an in-memory store, then prints the report.
//!
//! ## Cancellation
//! - `--deadline-ms` cancels the run after a fixed time; all stages drain and exit.
//! - `--samples 0` (or negative) runs unbounded, so pair it with a deadline.
//!
//! ## Outputs
//! - Report on stdout (kept / dropped / first / last).
//! - Optional `--export <path>` CSV of every stored record.
//! - Logs on stderr, controlled by `RUST_LOG`.
//! - Non-zero exit if any stage thread panicked.

use anyhow::Context;
use clap::Parser;
use log::{error, info, warn};
use std::{path::PathBuf, time::Duration};

use sensor_pipeline::{
    pipeline::{filter::FilterBounds, generator::SampleCount, Pipeline},
    utils::{
        config::{
            PipelineConfig, DEFAULT_INTERVAL_MS, DEFAULT_MAX_C, DEFAULT_MIN_C, DEFAULT_SAMPLES,
            DEFAULT_SENSOR_ID, DEFAULT_THRESHOLD_C,
        },
        export::export_snapshot_csv,
        stats::summarize,
    },
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Concurrent sensor sample pipeline")]
struct Args {
    /// Load the run configuration from JSON (other run flags are ignored)
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value = DEFAULT_SENSOR_ID)]
    sensor: String,
    /// Number of samples; 0 or negative runs until cancelled
    #[arg(long, default_value_t = DEFAULT_SAMPLES, allow_negative_numbers = true)]
    samples: i64,
    #[arg(long, default_value_t = DEFAULT_INTERVAL_MS)]
    interval_ms: u64,
    #[arg(long, default_value_t = DEFAULT_MIN_C, allow_negative_numbers = true)]
    min: f64,
    #[arg(long, default_value_t = DEFAULT_MAX_C, allow_negative_numbers = true)]
    max: f64,
    /// Readings below this are dropped even when inside [min, max]
    #[arg(long, default_value_t = DEFAULT_THRESHOLD_C, allow_negative_numbers = true)]
    threshold: f64,
    /// Cancel the run after this many milliseconds
    #[arg(long)]
    deadline_ms: Option<u64>,
    /// Write the stored records to this CSV file
    #[arg(long)]
    export: Option<PathBuf>,
}

impl Args {
    fn to_config(&self) -> anyhow::Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)
                .with_context(|| format!("loading pipeline config {}", path.display()))?,
            None => PipelineConfig {
                sensor_id: self.sensor.clone(),
                samples: self.samples,
                interval: Duration::from_millis(self.interval_ms),
                bounds: FilterBounds::new(self.min, self.max, self.threshold),
                ..Default::default()
            },
        };
        if let Some(ms) = self.deadline_ms {
            config.deadline = Some(Duration::from_millis(ms));
        }
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = args.to_config()?;

    info!("=== SENSOR PIPELINE START ===");
    let pipeline = Pipeline::new(config)?;
    if pipeline.config().sample_count() == SampleCount::Unbounded
        && pipeline.config().deadline.is_none()
    {
        warn!("[main] unbounded run with no deadline; it stops only when interrupted");
    }
    let handle = pipeline.spawn()?;
    let store = handle.store();
    let report = handle.join();

    println!("\n=== REPORT ===");
    print!("{}", report);
    if report.cancelled {
        println!("(run cancelled: {} readings generated)", report.generated);
    }

    let snapshot = store.snapshot();
    if let Some(stats) = summarize(&snapshot) {
        info!(
            "[main] stored celsius min={:.2} max={:.2} avg={:.2} n={}",
            stats.min, stats.max, stats.mean, stats.count
        );
    }

    if let Some(path) = &args.export {
        export_snapshot_csv(path, &snapshot)
            .with_context(|| format!("exporting snapshot to {}", path.display()))?;
    }

    if report.failed {
        let stages: Vec<&str> = report.failed_stages().map(|k| k.name()).collect();
        error!("[main] run failed: {} panicked", stages.join(", "));
        anyhow::bail!("pipeline stage panicked: {}", stages.join(", "));
    }

    info!("[main] exit");
    Ok(())
}
