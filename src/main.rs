//! Mobility Sensing demo
//!
//! Runs all three detectors on a synthetic lower-back recording and prints
//! the BIDS events table followed by the daily activity summary.
//!
//! Usage: `mobility-sensing [config.toml]`. Set `RUST_LOG=debug` for
//! per-stage detail.

use std::f64::consts::PI;

use chrono::{Duration, NaiveDate};
use log::{error, info};

use mobility_sensing::export::daily_summary_tsv;
use mobility_sensing::{
    AccelUnit, DetectionConfig, Error, GaitPipeline, PhysicalActivityMonitor, Result, Signal,
    TimedSignal,
};

const TRACKING_SYSTEM: &str = "LowerBack";

/// Two minutes of standing with a 45 s walk at 2 steps/s in the middle.
fn synthetic_recording(fs: f64) -> Vec<[f64; 3]> {
    let n = (120.0 * fs) as usize;
    (0..n)
        .map(|i| {
            let t = i as f64 / fs;
            let gait = if (30.0..75.0).contains(&t) {
                0.3 * (2.0 * PI * 2.0 * t).sin() + 0.05 * (2.0 * PI * 4.0 * t).sin()
            } else {
                0.0
            };
            [0.02, -0.05 + 0.1 * gait, 0.98 + gait]
        })
        .collect()
}

fn run() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => DetectionConfig::load(&path)?,
        None => DetectionConfig::default(),
    };
    let fs = config.activity.sampling_freq_hz;
    let samples = synthetic_recording(fs);

    let signal = Signal::new(samples.clone(), fs, AccelUnit::G)?;
    let analysis = GaitPipeline::new(&config)?.analyze(&signal)?;
    for summary in analysis.summaries() {
        info!(
            "gait sequence {}: {:.2}s, {} contacts, cadence {:?} steps/min",
            summary.id, summary.duration, summary.contact_count, summary.cadence_spm
        );
    }
    print!("{}", analysis.events(Some(TRACKING_SYSTEM)).to_tsv());
    println!();

    let start = NaiveDate::from_ymd_opt(2024, 3, 19)
        .and_then(|d| d.and_hms_opt(9, 0, 0))
        .ok_or_else(|| Error::InvalidConfig("invalid demo start time".to_string()))?;
    let step_us = (1e6 / fs).round() as i64;
    let timestamps = (0..samples.len() as i64)
        .map(|i| start + Duration::microseconds(i * step_us))
        .collect();
    let recording = TimedSignal::with_timestamps(timestamps, samples);
    let report = PhysicalActivityMonitor::new(config.activity.clone())?.detect(&recording)?;
    print!("{}", daily_summary_tsv(&report.daily));
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(e) = run() {
        error!("{e}");
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
