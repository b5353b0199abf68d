//! Core data types for the mobility detection core.
//!
//! This module defines the inputs (acceleration signals and their units) and
//! the derived, immutable outputs of the three detectors: gait sequences,
//! initial contacts and activity epochs.
//!
//! Design principle: Types should make intent obvious. If a concept exists,
//! it gets a type. Never pass raw tuples or untyped collections across boundaries.
//!
//! All quantities are `f64`. Detection must be reproducible bit-for-bit, and
//! day-long recordings accumulate rounding error quickly in single precision.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Standard gravity in m/s².
pub const STANDARD_GRAVITY: f64 = 9.80665;

/// Event type label written for gait sequences.
pub const GAIT_SEQUENCE_EVENT: &str = "gait sequence";

/// Event type label written for initial contacts.
pub const INITIAL_CONTACT_EVENT: &str = "initial contact";

/// Unit in which the caller declares acceleration samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AccelUnit {
    /// Multiples of standard gravity.
    #[default]
    G,
    /// Milli-g.
    MilliG,
    /// Metres per second squared.
    MetersPerSecondSquared,
}

impl AccelUnit {
    /// Factor that converts a value in this unit to g.
    pub fn to_g_factor(self) -> f64 {
        match self {
            AccelUnit::G => 1.0,
            AccelUnit::MilliG => 1.0e-3,
            AccelUnit::MetersPerSecondSquared => 1.0 / STANDARD_GRAVITY,
        }
    }

    /// Canonical spelling of the unit.
    pub fn as_str(self) -> &'static str {
        match self {
            AccelUnit::G => "g",
            AccelUnit::MilliG => "mg",
            AccelUnit::MetersPerSecondSquared => "m/s^2",
        }
    }
}

impl FromStr for AccelUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "g" => Ok(AccelUnit::G),
            "mg" => Ok(AccelUnit::MilliG),
            "m/s^2" | "m/s2" | "ms^-2" => Ok(AccelUnit::MetersPerSecondSquared),
            other => Err(Error::UnknownUnit(other.to_string())),
        }
    }
}

impl TryFrom<String> for AccelUnit {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<AccelUnit> for String {
    fn from(unit: AccelUnit) -> Self {
        unit.as_str().to_string()
    }
}

impl fmt::Display for AccelUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reject empty input and non-finite samples.
fn validate_samples(samples: &[[f64; 3]]) -> Result<()> {
    if samples.is_empty() {
        return Err(Error::InvalidSignal("signal has no samples".to_string()));
    }
    if let Some(pos) = samples
        .iter()
        .position(|s| s.iter().any(|v| !v.is_finite()))
    {
        return Err(Error::InvalidSignal(format!(
            "non-finite sample at index {pos}"
        )));
    }
    Ok(())
}

/// A uniformly sampled three-axis acceleration signal.
///
/// Invariants enforced at construction:
/// - at least one sample
/// - every component is finite (missing values are rejected, never dropped)
/// - sampling frequency is finite and > 0
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    samples: Vec<[f64; 3]>,
    sampling_freq_hz: f64,
    unit: AccelUnit,
}

impl Signal {
    /// Create a validated signal.
    pub fn new(samples: Vec<[f64; 3]>, sampling_freq_hz: f64, unit: AccelUnit) -> Result<Self> {
        if !sampling_freq_hz.is_finite() || sampling_freq_hz <= 0.0 {
            return Err(Error::InvalidSignal(format!(
                "sampling frequency must be a positive number, got {sampling_freq_hz}"
            )));
        }
        validate_samples(&samples)?;
        Ok(Self {
            samples,
            sampling_freq_hz,
            unit,
        })
    }

    /// Raw samples in the declared unit.
    pub fn samples(&self) -> &[[f64; 3]] {
        &self.samples
    }

    /// Sampling frequency in Hz.
    pub fn sampling_freq_hz(&self) -> f64 {
        self.sampling_freq_hz
    }

    /// Declared acceleration unit.
    pub fn unit(&self) -> AccelUnit {
        self.unit
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the signal holds no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Signal length in seconds (`len / fs`).
    pub fn duration_s(&self) -> f64 {
        self.samples.len() as f64 / self.sampling_freq_hz
    }

    /// Samples converted to g.
    pub fn samples_in_g(&self) -> Vec<[f64; 3]> {
        let k = self.unit.to_g_factor();
        self.samples
            .iter()
            .map(|s| [s[0] * k, s[1] * k, s[2] * k])
            .collect()
    }
}

/// Row index of a tabular recording.
#[derive(Debug, Clone, PartialEq)]
pub enum TimeIndex {
    /// Wall-clock timestamp for every sample.
    Datetime(Vec<NaiveDateTime>),
    /// Plain 0..N row positions.
    Positional,
}

/// A tabular acceleration recording with a row index.
///
/// The index is validated by the consumer, not here: only activity monitoring
/// requires timestamps, and it must report a missing datetime index as its
/// own precondition failure. Sampling frequency and unit are declared in the
/// activity configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedSignal {
    /// Row index.
    pub index: TimeIndex,
    /// Samples `[x, y, z]`.
    pub samples: Vec<[f64; 3]>,
}

impl TimedSignal {
    /// Create a datetime-indexed recording.
    pub fn with_timestamps(timestamps: Vec<NaiveDateTime>, samples: Vec<[f64; 3]>) -> Self {
        Self {
            index: TimeIndex::Datetime(timestamps),
            samples,
        }
    }

    /// Create a recording indexed by row position only.
    pub fn positional(samples: Vec<[f64; 3]>) -> Self {
        Self {
            index: TimeIndex::Positional,
            samples,
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the recording has no rows.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Validate the datetime index and samples, returning the timestamps.
    ///
    /// Fails with [`Error::IndexNotDatetime`] for a positional index and
    /// [`Error::NonIncreasingIndex`] when timestamps repeat or go backwards.
    pub fn validated_timestamps(&self) -> Result<&[NaiveDateTime]> {
        let timestamps = match &self.index {
            TimeIndex::Datetime(ts) => ts.as_slice(),
            TimeIndex::Positional => return Err(Error::IndexNotDatetime),
        };
        validate_samples(&self.samples)?;
        if timestamps.len() != self.samples.len() {
            return Err(Error::InvalidSignal(format!(
                "index has {} entries but signal has {} samples",
                timestamps.len(),
                self.samples.len()
            )));
        }
        if let Some(pos) = timestamps.windows(2).position(|w| w[1] <= w[0]) {
            return Err(Error::NonIncreasingIndex { position: pos + 1 });
        }
        Ok(timestamps)
    }
}

/// A bounded interval classified as locomotion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaitSequence {
    /// 0-based id in onset order.
    pub id: usize,
    /// Seconds from the start of the signal.
    pub onset: f64,
    /// Length in seconds (> 0).
    pub duration: f64,
}

impl GaitSequence {
    /// Create a gait sequence.
    pub fn new(id: usize, onset: f64, duration: f64) -> Self {
        Self {
            id,
            onset,
            duration,
        }
    }

    /// End of the sequence in seconds (exclusive).
    pub fn end(&self) -> f64 {
        self.onset + self.duration
    }

    /// Whether `t` lies in `[onset, onset + duration)`.
    pub fn contains(&self, t: f64) -> bool {
        t >= self.onset && t < self.end()
    }

    /// Event type label.
    pub fn event_type(&self) -> &'static str {
        GAIT_SEQUENCE_EVENT
    }
}

/// A detected foot-contact instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InitialContact {
    /// Absolute time in seconds from the start of the signal.
    pub onset: f64,
    /// Id of the parent [`GaitSequence`].
    pub gait_sequence_id: usize,
}

impl InitialContact {
    /// Create an initial contact.
    pub fn new(onset: f64, gait_sequence_id: usize) -> Self {
        Self {
            onset,
            gait_sequence_id,
        }
    }

    /// Event type label.
    pub fn event_type(&self) -> &'static str {
        INITIAL_CONTACT_EVENT
    }
}

/// Physical activity intensity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityLevel {
    /// Below the sedentary cut point.
    Sedentary,
    /// Between the sedentary and light cut points.
    Light,
    /// Between the light and moderate cut points.
    Moderate,
    /// At or above the moderate cut point.
    Vigorous,
}

impl ActivityLevel {
    /// All levels in increasing intensity.
    pub const ALL: [ActivityLevel; 4] = [
        ActivityLevel::Sedentary,
        ActivityLevel::Light,
        ActivityLevel::Moderate,
        ActivityLevel::Vigorous,
    ];

    /// Lower-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityLevel::Sedentary => "sedentary",
            ActivityLevel::Light => "light",
            ActivityLevel::Moderate => "moderate",
            ActivityLevel::Vigorous => "vigorous",
        }
    }

    /// Position in [`ActivityLevel::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }
}

/// One fixed-duration window of activity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActivityEpoch {
    /// Start of the epoch bin.
    pub epoch_start: NaiveDateTime,
    /// Mean ENMO over the epoch in milli-g (≥ 0).
    pub enmo_mg: f64,
    /// Intensity classification.
    pub level: ActivityLevel,
    /// Number of samples that fell in the bin.
    pub sample_count: usize,
    /// True when the bin holds fewer samples than a full epoch.
    pub partial: bool,
}

/// Time and mean intensity for one level on one day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelSummary {
    /// Total minutes spent at this level.
    pub time_min: f64,
    /// Mean epoch ENMO at this level, `None` when no epoch reached it.
    pub mean_enmo_mg: Option<f64>,
}

/// Per-day totals for every activity level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyActivity {
    /// Calendar date of the epochs.
    pub date: NaiveDate,
    /// Summaries indexed by [`ActivityLevel::index`].
    pub levels: [LevelSummary; 4],
}

impl DailyActivity {
    /// Summary for one level.
    pub fn level(&self, level: ActivityLevel) -> &LevelSummary {
        &self.levels[level.index()]
    }

    /// Total classified minutes on this day.
    pub fn total_min(&self) -> f64 {
        self.levels.iter().map(|l| l.time_min).sum()
    }
}

/// Hourly mean ENMO for one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyEnmo {
    /// Calendar date.
    pub date: NaiveDate,
    /// Mean sample-level ENMO in mg per hour of day, `None` for hours without data.
    pub hours: [Option<f64>; 24],
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn ts(sec: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 19)
            .and_then(|d| d.and_hms_opt(0, 0, sec))
            .unwrap()
    }

    #[test]
    fn test_unit_parsing() {
        assert_eq!("g".parse::<AccelUnit>().unwrap(), AccelUnit::G);
        assert_eq!("mg".parse::<AccelUnit>().unwrap(), AccelUnit::MilliG);
        assert_eq!(
            "m/s^2".parse::<AccelUnit>().unwrap(),
            AccelUnit::MetersPerSecondSquared
        );
        assert!(matches!(
            "furlongs".parse::<AccelUnit>(),
            Err(Error::UnknownUnit(_))
        ));
    }

    #[test]
    fn test_unit_conversion() {
        let s = Signal::new(
            vec![[0.0, 0.0, STANDARD_GRAVITY]],
            100.0,
            AccelUnit::MetersPerSecondSquared,
        )
        .unwrap();
        assert_relative_eq!(s.samples_in_g()[0][2], 1.0, epsilon = 1e-12);

        let s = Signal::new(vec![[1000.0, 0.0, 0.0]], 100.0, AccelUnit::MilliG).unwrap();
        assert_relative_eq!(s.samples_in_g()[0][0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_signal_rejects_bad_input() {
        assert!(matches!(
            Signal::new(vec![], 100.0, AccelUnit::G),
            Err(Error::InvalidSignal(_))
        ));
        assert!(matches!(
            Signal::new(vec![[0.0, f64::NAN, 0.0]], 100.0, AccelUnit::G),
            Err(Error::InvalidSignal(_))
        ));
        assert!(matches!(
            Signal::new(vec![[0.0; 3]], 0.0, AccelUnit::G),
            Err(Error::InvalidSignal(_))
        ));
    }

    #[test]
    fn test_signal_duration() {
        let s = Signal::new(vec![[0.0; 3]; 250], 100.0, AccelUnit::G).unwrap();
        assert_relative_eq!(s.duration_s(), 2.5);
        assert_eq!(s.len(), 250);
        assert!(!s.is_empty());
    }

    #[test]
    fn test_positional_index_rejected() {
        let t = TimedSignal::positional(vec![[0.0, 0.0, 1.0]; 4]);
        let err = t.validated_timestamps().unwrap_err();
        assert!(matches!(err, Error::IndexNotDatetime));
        assert_eq!(err.to_string(), "index must be a datetime index");
    }

    #[test]
    fn test_non_increasing_index_rejected() {
        let t = TimedSignal::with_timestamps(vec![ts(0), ts(1), ts(1)], vec![[0.0, 0.0, 1.0]; 3]);
        assert!(matches!(
            t.validated_timestamps(),
            Err(Error::NonIncreasingIndex { position: 2 })
        ));
    }

    #[test]
    fn test_gait_sequence_contains() {
        let gs = GaitSequence::new(0, 2.0, 3.0);
        assert!(gs.contains(2.0));
        assert!(gs.contains(4.99));
        assert!(!gs.contains(5.0));
        assert!(!gs.contains(1.99));
        assert_eq!(gs.event_type(), "gait sequence");
    }

    #[test]
    fn test_activity_level_order() {
        assert!(ActivityLevel::Sedentary < ActivityLevel::Light);
        assert!(ActivityLevel::Moderate < ActivityLevel::Vigorous);
        assert_eq!(ActivityLevel::Vigorous.index(), 3);
    }
}
