//! Mobility Sensing Library
//!
//! A detection core that turns raw accelerometer recordings into discrete
//! mobility events and activity-intensity summaries:
//!
//! - **Gait sequences**: bounded intervals of walking ([`gait_sequence`])
//! - **Initial contacts**: heel-strike instants inside each gait sequence
//!   ([`initial_contact`])
//! - **Physical activity**: per-epoch ENMO intensity levels and daily totals
//!   ([`activity`])
//!
//! # Design Philosophy
//!
//! - **Pure calls**: every detector is a function of its input and
//!   configuration. Results are returned as owned values, never stored on the
//!   detector, so detectors can be shared across threads.
//! - **Fail fast**: precondition violations (bad index, unknown unit,
//!   non-increasing thresholds, out-of-range intervals) are reported before
//!   any computation, with no partial output.
//! - **Unit invariance**: samples are normalized to g before any threshold is
//!   applied.
//! - **Reproducibility**: identical input and configuration give identical
//!   output, bit for bit.
//!
//! # Example
//!
//! ```no_run
//! use mobility_sensing::{AccelUnit, DetectionConfig, GaitPipeline, Signal};
//!
//! # fn main() -> mobility_sensing::Result<()> {
//! let samples = vec![[0.0, 0.0, 1.0]; 6000];
//! let signal = Signal::new(samples, 100.0, AccelUnit::G)?;
//!
//! let pipeline = GaitPipeline::new(&DetectionConfig::default())?;
//! let analysis = pipeline.analyze(&signal)?;
//! print!("{}", analysis.events(Some("LowerBack")).to_tsv());
//! # Ok(())
//! # }
//! ```

pub mod activity;
pub mod config;
pub mod error;
pub mod export;
pub mod gait_sequence;
pub mod initial_contact;
pub mod pipeline;
pub mod signal;
pub mod types;


// Re-export commonly used types
pub use activity::{ActivityReport, PhysicalActivityMonitor};
pub use config::{
    ActivityConfig, ActivityThresholds, DetectionConfig, GaitSequenceConfig,
    InitialContactConfig, PartialEpochPolicy, StepThreshold, VerticalAxis,
};
pub use error::{Error, Result};
pub use export::{EventRecord, EventTable};
pub use gait_sequence::GaitSequenceDetector;
pub use initial_contact::InitialContactDetector;
pub use pipeline::{GaitAnalysis, GaitPipeline};
pub use signal::{Conditioner, SignalConditioner};
pub use types::{
    AccelUnit, ActivityEpoch, ActivityLevel, DailyActivity, GaitSequence, InitialContact, Signal,
    TimeIndex, TimedSignal,
};
