//! Physical activity monitoring.
//!
//! Classifies sustained activity intensity over fixed epochs of a
//! datetime-indexed recording:
//! - Euclidean norm of the acceleration, in g
//! - Zero-phase low-pass (20 Hz by default) to remove sensor noise
//! - ENMO: `max(norm - 1, 0)` in milli-g
//! - Mean ENMO per epoch, classified against the configured cut points
//! - Time spent at each level per calendar day
//!
//! Why this matters: ENMO is the accepted intensity index for wrist and
//! lower-back accelerometry. Reporting it per epoch and per day makes
//! recordings of different lengths comparable.
//!
//! Design note: Epochs are time bins anchored at the first timestamp rather
//! than fixed sample counts. A recording with dropouts therefore never shifts
//! later epochs; a bin that lost samples is reported as partial instead.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use log::{debug, info, warn};

use crate::config::{ActivityConfig, PartialEpochPolicy};
use crate::error::{Error, Result};
use crate::signal::{euclidean_norm, Conditioner, SignalConditioner};
use crate::types::{
    ActivityEpoch, ActivityLevel, DailyActivity, HourlyEnmo, LevelSummary, TimedSignal,
};

/// Largest relative mismatch between the median timestamp step and `1 / fs`.
const RATE_TOLERANCE: f64 = 0.1;

/// Compare the median timestamp step with the configured sampling period.
///
/// The median ignores dropouts, so only a wrongly declared rate fails.
fn check_index_rate(timestamps: &[NaiveDateTime], sampling_freq_hz: f64) -> Result<()> {
    let mut steps_us: Vec<i64> = timestamps
        .windows(2)
        .filter_map(|w| (w[1] - w[0]).num_microseconds())
        .collect();
    if steps_us.is_empty() {
        return Ok(());
    }
    let mid = steps_us.len() / 2;
    let (_, median_us, _) = steps_us.select_nth_unstable(mid);
    let median_s = *median_us as f64 * 1e-6;
    let expected_s = 1.0 / sampling_freq_hz;
    if ((median_s - expected_s) / expected_s).abs() > RATE_TOLERANCE {
        return Err(Error::InvalidConfig(format!(
            "timestamps are {median_s}s apart (median) but sampling_freq_hz = {sampling_freq_hz} \
             implies {expected_s}s"
        )));
    }
    Ok(())
}

/// ENMO in milli-g from a filtered norm in g.
pub fn enmo_mg(norm_g: &[f64]) -> Vec<f64> {
    norm_g.iter().map(|v| (v - 1.0).max(0.0) * 1000.0).collect()
}

/// Result of one activity-monitoring run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ActivityReport {
    /// Classified epochs in time order.
    pub epochs: Vec<ActivityEpoch>,
    /// Per-day totals, sorted by date.
    pub daily: Vec<DailyActivity>,
    /// Hourly mean-ENMO profile, when requested.
    pub hourly: Option<Vec<HourlyEnmo>>,
}

impl ActivityReport {
    /// Epochs holding a full epoch's worth of samples.
    pub fn complete_epochs(&self) -> impl Iterator<Item = &ActivityEpoch> {
        self.epochs.iter().filter(|e| !e.partial)
    }

    /// Fraction of complete epochs classified at `level`.
    pub fn level_fraction(&self, level: ActivityLevel) -> f64 {
        let (hits, total) = self
            .complete_epochs()
            .fold((0usize, 0usize), |(hits, total), e| {
                (hits + usize::from(e.level == level), total + 1)
            });
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// Running sum for one epoch bin.
struct EpochBin {
    index: i64,
    sum: f64,
    count: usize,
}

/// Physical activity monitor.
#[derive(Debug, Clone)]
pub struct PhysicalActivityMonitor<C: Conditioner = SignalConditioner> {
    config: ActivityConfig,
    conditioner: C,
}

impl PhysicalActivityMonitor<SignalConditioner> {
    /// Create a monitor with the Butterworth low-pass described by `config`.
    pub fn new(config: ActivityConfig) -> Result<Self> {
        let conditioner = SignalConditioner::lowpass(config.filter_order, config.lowpass_cutoff_hz);
        Self::with_conditioner(config, conditioner)
    }
}

impl<C: Conditioner> PhysicalActivityMonitor<C> {
    /// Create a monitor with a custom conditioner.
    pub fn with_conditioner(config: ActivityConfig, conditioner: C) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            conditioner,
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &ActivityConfig {
        &self.config
    }

    /// Classify a recording into activity epochs and daily summaries.
    ///
    /// The index is checked first: a positional index fails with
    /// [`Error::IndexNotDatetime`] and repeated or backward timestamps with
    /// [`Error::NonIncreasingIndex`], before any filtering.
    pub fn detect(&self, signal: &TimedSignal) -> Result<ActivityReport> {
        let timestamps = signal.validated_timestamps()?;
        let cfg = &self.config;
        let fs = cfg.sampling_freq_hz;
        check_index_rate(timestamps, fs)?;

        let to_g = cfg.acceleration_unit.to_g_factor();
        let norm: Vec<f64> = euclidean_norm(&signal.samples)
            .into_iter()
            .map(|v| v * to_g)
            .collect();
        let filtered = self.conditioner.smooth(&norm, fs)?;
        let enmo = enmo_mg(&filtered);

        let epochs = self.epochs(timestamps, &enmo)?;
        let daily = self.daily_summary(&epochs);
        let hourly = cfg
            .hourly_profile
            .then(|| hourly_profile(timestamps, &enmo));

        info!(
            "PAM: {} samples -> {} epoch(s) over {} day(s)",
            enmo.len(),
            epochs.len(),
            daily.len()
        );
        Ok(ActivityReport {
            epochs,
            daily,
            hourly,
        })
    }

    fn epochs(&self, timestamps: &[NaiveDateTime], enmo: &[f64]) -> Result<Vec<ActivityEpoch>> {
        let cfg = &self.config;
        let Some(&t0) = timestamps.first() else {
            return Ok(Vec::new());
        };
        let epoch_us = i64::from(cfg.epoch_duration_sec) * 1_000_000;
        let full = cfg.samples_per_epoch();

        let mut epochs = Vec::new();
        let mut dropped = 0usize;
        let mut finish = |bin: EpochBin, epochs: &mut Vec<ActivityEpoch>| {
            let partial = bin.count < full;
            if partial && cfg.partial_epochs == PartialEpochPolicy::Exclude {
                dropped += 1;
                return;
            }
            let enmo_mg = bin.sum / bin.count as f64;
            epochs.push(ActivityEpoch {
                epoch_start: t0 + Duration::microseconds(bin.index * epoch_us),
                enmo_mg,
                level: cfg.thresholds_mg.classify(enmo_mg),
                sample_count: bin.count,
                partial,
            });
        };

        let mut current: Option<EpochBin> = None;
        for (i, (ts, &value)) in timestamps.iter().zip(enmo).enumerate() {
            let offset_us = (*ts - t0).num_microseconds().ok_or_else(|| {
                Error::InvalidSignal(format!("timestamp at position {i} is too far from the start"))
            })?;
            let index = offset_us / epoch_us;
            match current.as_mut() {
                Some(bin) if bin.index == index => {
                    bin.sum += value;
                    bin.count += 1;
                }
                _ => {
                    if let Some(bin) = current.take() {
                        finish(bin, &mut epochs);
                    }
                    current = Some(EpochBin {
                        index,
                        sum: value,
                        count: 1,
                    });
                }
            }
        }
        if let Some(bin) = current {
            finish(bin, &mut epochs);
        }

        if dropped > 0 {
            warn!(
                "PAM: dropped {dropped} partial epoch(s) with fewer than {full} samples"
            );
        }
        debug!(
            "PAM: {} epoch(s) of {}s, thresholds {:?}",
            epochs.len(),
            cfg.epoch_duration_sec,
            cfg.thresholds_mg
        );
        Ok(epochs)
    }

    fn daily_summary(&self, epochs: &[ActivityEpoch]) -> Vec<DailyActivity> {
        let epoch_min = f64::from(self.config.epoch_duration_sec) / 60.0;
        let mut days: BTreeMap<NaiveDate, [(f64, usize); 4]> = BTreeMap::new();
        for epoch in epochs.iter().filter(|e| !e.partial) {
            let slot = &mut days.entry(epoch.epoch_start.date()).or_default()[epoch.level.index()];
            slot.0 += epoch.enmo_mg;
            slot.1 += 1;
        }
        days.into_iter()
            .map(|(date, acc)| DailyActivity {
                date,
                levels: acc.map(|(sum, count)| LevelSummary {
                    time_min: count as f64 * epoch_min,
                    mean_enmo_mg: (count > 0).then(|| sum / count as f64),
                }),
            })
            .collect()
    }
}

/// Sample-level mean ENMO per hour of each day.
fn hourly_profile(timestamps: &[NaiveDateTime], enmo: &[f64]) -> Vec<HourlyEnmo> {
    let mut days: BTreeMap<NaiveDate, [(f64, usize); 24]> = BTreeMap::new();
    for (ts, &value) in timestamps.iter().zip(enmo) {
        let slot = &mut days.entry(ts.date()).or_insert([(0.0, 0); 24])[ts.hour() as usize];
        slot.0 += value;
        slot.1 += 1;
    }
    days.into_iter()
        .map(|(date, acc)| HourlyEnmo {
            date,
            hours: acc.map(|(sum, count)| (count > 0).then(|| sum / count as f64)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ActivityThresholds;
    use crate::types::{AccelUnit, STANDARD_GRAVITY};
    use approx::assert_abs_diff_eq;

    fn start(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 19)
            .and_then(|d| d.and_hms_opt(h, m, s))
            .unwrap()
    }

    /// Constant `[0, 0, z]` sampled at 100 Hz from `t0`.
    fn recording(t0: NaiveDateTime, seconds: f64, z: f64) -> TimedSignal {
        let n = (seconds * 100.0) as usize;
        let timestamps = (0..n)
            .map(|i| t0 + Duration::milliseconds(i as i64 * 10))
            .collect();
        TimedSignal::with_timestamps(timestamps, vec![[0.0, 0.0, z]; n])
    }

    fn monitor(config: ActivityConfig) -> PhysicalActivityMonitor {
        PhysicalActivityMonitor::new(config).unwrap()
    }

    #[test]
    fn test_enmo_clips_below_gravity() {
        let enmo = enmo_mg(&[0.8, 1.0, 1.25]);
        assert_eq!(enmo, vec![0.0, 0.0, 250.0]);
    }

    #[test]
    fn test_standing_still_is_sedentary() {
        let report = monitor(ActivityConfig::default())
            .detect(&recording(start(9, 0, 0), 60.0, 1.0))
            .unwrap();
        assert_eq!(report.epochs.len(), 12);
        for epoch in &report.epochs {
            assert_abs_diff_eq!(epoch.enmo_mg, 0.0, epsilon = 1e-6);
            assert_eq!(epoch.level, ActivityLevel::Sedentary);
            assert_eq!(epoch.sample_count, 500);
        }
        assert_eq!(report.level_fraction(ActivityLevel::Sedentary), 1.0);
        assert!(report.hourly.is_none());
    }

    #[test]
    fn test_vigorous_signal() {
        let report = monitor(ActivityConfig::default())
            .detect(&recording(start(9, 0, 0), 30.0, 1.5))
            .unwrap();
        for epoch in &report.epochs {
            assert_abs_diff_eq!(epoch.enmo_mg, 500.0, epsilon = 1e-6);
            assert_eq!(epoch.level, ActivityLevel::Vigorous);
        }
        let day = &report.daily[0];
        assert_abs_diff_eq!(day.level(ActivityLevel::Vigorous).time_min, 0.5);
        assert_eq!(day.level(ActivityLevel::Sedentary).mean_enmo_mg, None);
    }

    #[test]
    fn test_unit_conversion_before_enmo() {
        let config = ActivityConfig {
            acceleration_unit: AccelUnit::MetersPerSecondSquared,
            ..Default::default()
        };
        let report = monitor(config)
            .detect(&recording(start(9, 0, 0), 10.0, 1.2 * STANDARD_GRAVITY))
            .unwrap();
        for epoch in &report.epochs {
            assert_abs_diff_eq!(epoch.enmo_mg, 200.0, epsilon = 1e-6);
            assert_eq!(epoch.level, ActivityLevel::Moderate);
        }
    }

    #[test]
    fn test_positional_index_rejected() {
        let signal = TimedSignal::positional(vec![[0.0, 0.0, 1.0]; 1000]);
        let err = monitor(ActivityConfig::default()).detect(&signal).unwrap_err();
        assert!(matches!(err, Error::IndexNotDatetime));
        assert_eq!(err.to_string(), "index must be a datetime index");
    }

    #[test]
    fn test_non_increasing_index_rejected() {
        let mut signal = recording(start(9, 0, 0), 10.0, 1.0);
        if let crate::types::TimeIndex::Datetime(ts) = &mut signal.index {
            ts[400] = ts[399];
        }
        let err = monitor(ActivityConfig::default()).detect(&signal).unwrap_err();
        assert!(matches!(err, Error::NonIncreasingIndex { position: 400 }));
    }

    #[test]
    fn test_partial_epoch_policy() {
        let signal = recording(start(9, 0, 0), 62.0, 1.0);

        let excluded = monitor(ActivityConfig::default()).detect(&signal).unwrap();
        assert_eq!(excluded.epochs.len(), 12);
        assert!(excluded.epochs.iter().all(|e| !e.partial));

        let flagged = monitor(ActivityConfig {
            partial_epochs: PartialEpochPolicy::Flag,
            ..Default::default()
        })
        .detect(&signal)
        .unwrap();
        assert_eq!(flagged.epochs.len(), 13);
        let last = flagged.epochs.last().unwrap();
        assert!(last.partial);
        assert_eq!(last.sample_count, 200);

        // Daily totals only count complete epochs under either policy.
        assert_abs_diff_eq!(excluded.daily[0].total_min(), 1.0);
        assert_abs_diff_eq!(flagged.daily[0].total_min(), 1.0);
    }

    #[test]
    fn test_epochs_tile_without_gaps() {
        let t0 = start(9, 0, 0);
        let report = monitor(ActivityConfig::default())
            .detect(&recording(t0, 60.0, 1.0))
            .unwrap();
        for (k, epoch) in report.epochs.iter().enumerate() {
            assert_eq!(epoch.epoch_start, t0 + Duration::seconds(5 * k as i64));
        }
    }

    #[test]
    fn test_dropout_skips_empty_bins() {
        let t0 = start(9, 0, 0);
        let mut timestamps: Vec<NaiveDateTime> = (0..1000)
            .map(|i| t0 + Duration::milliseconds(i * 10))
            .collect();
        // 20 s gap, then another 10 s
        timestamps.extend((0..1000).map(|i| t0 + Duration::milliseconds(30_000 + i * 10)));
        let signal = TimedSignal::with_timestamps(timestamps, vec![[0.0, 0.0, 1.0]; 2000]);
        let report = monitor(ActivityConfig::default()).detect(&signal).unwrap();
        let starts: Vec<i64> = report
            .epochs
            .iter()
            .map(|e| (e.epoch_start - t0).num_seconds())
            .collect();
        assert_eq!(starts, vec![0, 5, 30, 35]);
    }

    #[test]
    fn test_daily_summary_splits_at_midnight() {
        let report = monitor(ActivityConfig::default())
            .detect(&recording(start(23, 59, 0), 120.0, 1.0))
            .unwrap();
        assert_eq!(report.daily.len(), 2);
        assert!(report.daily[0].date < report.daily[1].date);
        for day in &report.daily {
            assert_abs_diff_eq!(day.level(ActivityLevel::Sedentary).time_min, 1.0);
        }
    }

    #[test]
    fn test_hourly_profile() {
        let config = ActivityConfig {
            hourly_profile: true,
            ..Default::default()
        };
        let report = monitor(config)
            .detect(&recording(start(10, 59, 30), 60.0, 1.1))
            .unwrap();
        let hourly = report.hourly.unwrap();
        assert_eq!(hourly.len(), 1);
        let hours = &hourly[0].hours;
        assert_abs_diff_eq!(hours[10].unwrap(), 100.0, epsilon = 1e-6);
        assert_abs_diff_eq!(hours[11].unwrap(), 100.0, epsilon = 1e-6);
        assert_eq!(hours.iter().filter(|h| h.is_some()).count(), 2);
    }

    #[test]
    fn test_custom_thresholds() {
        let config = ActivityConfig {
            thresholds_mg: ActivityThresholds::new(10.0, 20.0, 30.0).unwrap(),
            ..Default::default()
        };
        let report = monitor(config)
            .detect(&recording(start(9, 0, 0), 10.0, 1.025))
            .unwrap();
        assert!(report
            .epochs
            .iter()
            .all(|e| e.level == ActivityLevel::Moderate));
    }

    #[test]
    fn test_declared_rate_must_match_index() {
        // 50 Hz timestamps against the default 100 Hz
        let t0 = start(9, 0, 0);
        let timestamps = (0..1500)
            .map(|i| t0 + Duration::milliseconds(i * 20))
            .collect();
        let signal = TimedSignal::with_timestamps(timestamps, vec![[0.0, 0.0, 1.0]; 1500]);
        let err = monitor(ActivityConfig::default()).detect(&signal).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)), "{err}");

        let matching = monitor(ActivityConfig {
            sampling_freq_hz: 50.0,
            ..Default::default()
        })
        .detect(&signal)
        .unwrap();
        assert_eq!(matching.epochs.len(), 6);
    }

    #[test]
    fn test_too_short_for_filter() {
        let err = monitor(ActivityConfig::default())
            .detect(&recording(start(9, 0, 0), 0.1, 1.0))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidSignal(_)));
    }
}
