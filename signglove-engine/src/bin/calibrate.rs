//! Calibration profile builder
//!
//! Builds a bend-sensor calibration profile from two telemetry captures:
//! one recorded with the hand relaxed, one with every finger fully bent.
//!
//! **Usage:**
//! ```bash
//! signglove-calibrate --rest rest.csv --flex flex.csv --output calibration_ana.json --username ana
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use signglove_engine::calibration::CalibrationProfile;
use signglove_engine::stream::StreamReassembler;
use signglove_engine::Record;
use std::path::{Path, PathBuf};
use tracing::info;

/// Calibration profile builder
#[derive(Parser, Debug)]
#[command(name = "signglove-calibrate")]
#[command(about = "Build a bend-sensor calibration profile from rest and flex captures")]
struct Args {
    /// Telemetry captured with the hand at rest
    #[arg(long, value_name = "FILE")]
    rest: PathBuf,

    /// Telemetry captured with all fingers fully bent
    #[arg(long, value_name = "FILE")]
    flex: PathBuf,

    /// Output profile JSON (defaults to calibration_<username>.json)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// User the profile belongs to
    #[arg(short, long, default_value = "default")]
    username: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "signglove_calibrate=info,signglove_engine=warn".into()),
        )
        .init();

    let args = Args::parse();

    let rest = read_capture(&args.rest)?;
    let flex = read_capture(&args.flex)?;
    info!("Rest capture: {} records, flex capture: {} records", rest.len(), flex.len());

    let profile = CalibrationProfile::from_captures(&rest, &flex).context("Failed to build calibration profile")?;
    info!("Baselines: {:?}", profile.sensor_baselines);
    info!("Maximums: {:?}", profile.sensor_maximums);

    if profile
        .sensor_baselines
        .iter()
        .zip(&profile.sensor_maximums)
        .any(|(baseline, maximum)| maximum <= baseline)
    {
        bail!("flex capture does not exceed the rest baseline on every sensor; recapture with fingers fully bent");
    }

    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(format!("calibration_{}.json", args.username)));
    let file = profile.into_file(Some(args.username));
    let json = serde_json::to_string_pretty(&file).context("Failed to serialize profile")?;
    std::fs::write(&output, json).with_context(|| format!("Failed to write {}", output.display()))?;

    info!("Calibration profile written to {}", output.display());
    Ok(())
}

fn read_capture(path: &Path) -> Result<Vec<Record>> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let mut reassembler = StreamReassembler::default();
    reassembler.feed(&bytes);
    // Terminate a final line without a newline
    reassembler.feed(b"\n");
    let records = reassembler.drain();
    if records.is_empty() {
        bail!("{} contains no telemetry records", path.display());
    }
    Ok(records)
}
