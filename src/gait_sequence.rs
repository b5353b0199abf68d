//! Gait sequence detection.
//!
//! Segments a continuous acceleration stream into bounded intervals of
//! locomotion-like activity.
//!
//! Design: envelope thresholding + merge/reject policy + step validation
//! - Each axis in g, resampled to a fixed working rate
//! - Zero-phase band-pass per axis around step cadence (removes gravity and
//!   drift without rectifying the oscillation)
//! - Magnitude of the band-passed vector, then a moving-RMS envelope at a
//!   coarser scale (suppresses isolated spikes)
//! - Contiguous spans with `envelope >= threshold` become candidates
//! - Candidates separated by short pauses merge; short results are dropped
//! - Survivors must hold enough steps: peaks of both polarities on the
//!   dominant axis, grouped into pulse trains
//!
//! Why the envelope:
//! A turn or a stair transition produces a short burst of energy. Walking
//! produces a sustained oscillation. Averaging energy over a one-second window
//! and then requiring several seconds of activity separates the two. The step
//! count then rejects sustained vibration that lacks a step rhythm.

use log::{debug, info};

use crate::config::{GaitSequenceConfig, StepThreshold};
use crate::error::Result;
use crate::initial_contact::local_maxima;
use crate::signal::{euclidean_norm, resample_linear, Conditioner, SignalConditioner};
use crate::types::{GaitSequence, Signal};

/// A half-open run of samples `[start, end)` on the working-rate grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// First sample.
    pub start: usize,
    /// One past the last sample.
    pub end: usize,
}

impl Span {
    /// Number of samples.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether the span has no samples.
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// Contiguous runs where `envelope[i] >= threshold`.
///
/// Equality counts as active so that ties resolve toward inclusion.
pub fn active_spans(envelope: &[f64], threshold: f64) -> Vec<Span> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, &v) in envelope.iter().enumerate() {
        match (v >= threshold, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                spans.push(Span { start: s, end: i });
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push(Span {
            start: s,
            end: envelope.len(),
        });
    }
    spans
}

/// Merge spans separated by a gap of at most `max_gap_s` seconds.
///
/// Input must be sorted and non-overlapping, as produced by [`active_spans`].
pub fn merge_spans(spans: &[Span], max_gap_s: f64, sampling_freq_hz: f64) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::with_capacity(spans.len());
    for &span in spans {
        match merged.last_mut() {
            Some(prev) if (span.start - prev.end) as f64 / sampling_freq_hz <= max_gap_s => {
                prev.end = span.end;
            }
            _ => merged.push(span),
        }
    }
    merged
}

/// Drop spans shorter than `min_duration_s` seconds.
pub fn reject_short(spans: Vec<Span>, min_duration_s: f64, sampling_freq_hz: f64) -> Vec<Span> {
    spans
        .into_iter()
        .filter(|s| s.len() as f64 / sampling_freq_hz >= min_duration_s)
        .collect()
}

/// Sizes of the pulse trains in `peaks`.
///
/// `peaks` must be sorted. A gap wider than `max_interval` samples ends a train.
pub fn pulse_trains(peaks: &[usize], max_interval: usize) -> Vec<usize> {
    let mut trains = Vec::new();
    let mut size = 0;
    for (i, &p) in peaks.iter().enumerate() {
        if i > 0 && p - peaks[i - 1] > max_interval {
            trains.push(size);
            size = 0;
        }
        size += 1;
    }
    if size > 0 {
        trains.push(size);
    }
    trains
}

/// Maxima at or above `threshold` and minima at or below `-threshold`.
fn step_peaks(x: &[f64], threshold: f64) -> (Vec<usize>, Vec<usize>) {
    let negated: Vec<f64> = x.iter().map(|v| -v).collect();
    let maxima = local_maxima(x)
        .into_iter()
        .filter(|&p| x[p] >= threshold)
        .collect();
    let minima = local_maxima(&negated)
        .into_iter()
        .filter(|&p| negated[p] >= threshold)
        .collect();
    (maxima, minima)
}

/// Steps in a band-passed gait signal.
///
/// Maxima and minima are grouped into pulse trains separately; only trains of
/// at least `min_pulse_steps` peaks count. A step needs both polarities, so the
/// result is the smaller of the two totals.
pub fn count_steps(x: &[f64], threshold: f64, max_interval: usize, min_pulse_steps: usize) -> usize {
    let (maxima, minima) = step_peaks(x, threshold);
    let in_trains = |peaks: &[usize]| -> usize {
        pulse_trains(peaks, max_interval)
            .into_iter()
            .filter(|&n| n >= min_pulse_steps)
            .sum()
    };
    in_trains(maxima.as_slice()).min(in_trains(minima.as_slice()))
}

/// Linearly interpolated percentile of `values` (`pct` in `[0, 100]`).
pub fn percentile(values: &[f64], pct: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let rank = pct.clamp(0.0, 100.0) / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64))
}

/// The samples of `span` on the band-passed axis with the most energy there.
fn dominant_axis<'a>(band: &'a [Vec<f64>; 3], span: &Span) -> &'a [f64] {
    let energy = |x: &[f64]| x.iter().map(|v| v * v).sum::<f64>();
    band.iter()
        .map(|axis| &axis[span.start.min(axis.len())..span.end.min(axis.len())])
        .max_by(|a, b| energy(*a).total_cmp(&energy(*b)))
        .unwrap_or_default()
}

/// Step-peak threshold derived from the peaks inside `active`.
///
/// Positive maxima and the magnitudes of negative minima are pooled; the
/// threshold is their `pct` percentile, or `fallback` when there are none.
pub fn adaptive_step_threshold(band: &[Vec<f64>; 3], active: &[Span], pct: f64, fallback: f64) -> f64 {
    let mut magnitudes = Vec::new();
    for span in active {
        let x = dominant_axis(band, span);
        let (maxima, minima) = step_peaks(x, f64::MIN_POSITIVE);
        magnitudes.extend(maxima.into_iter().map(|p| x[p]));
        magnitudes.extend(minima.into_iter().map(|p| -x[p]));
    }
    percentile(&magnitudes, pct).unwrap_or(fallback)
}

/// Gait sequence detector.
///
/// Stateless apart from its configuration: [`GaitSequenceDetector::detect`]
/// is a pure function of the signal, so one detector can be shared across
/// threads and recordings.
#[derive(Debug, Clone)]
pub struct GaitSequenceDetector<C: Conditioner = SignalConditioner> {
    config: GaitSequenceConfig,
    conditioner: C,
}

impl GaitSequenceDetector<SignalConditioner> {
    /// Create a detector with the Butterworth conditioner described by `config`.
    pub fn new(config: GaitSequenceConfig) -> Result<Self> {
        let conditioner = Self::conditioner_for(&config);
        Self::with_conditioner(config, conditioner)
    }

    fn conditioner_for(config: &GaitSequenceConfig) -> SignalConditioner {
        SignalConditioner::bandpass(config.filter_order, config.band_low_hz, config.band_high_hz)
            .with_envelope_window(config.envelope_window_s)
    }
}

impl Default for GaitSequenceDetector<SignalConditioner> {
    fn default() -> Self {
        let config = GaitSequenceConfig::default();
        Self {
            conditioner: Self::conditioner_for(&config),
            config,
        }
    }
}

impl<C: Conditioner> GaitSequenceDetector<C> {
    /// Create a detector with a custom conditioner.
    pub fn with_conditioner(config: GaitSequenceConfig, conditioner: C) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            conditioner,
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &GaitSequenceConfig {
        &self.config
    }

    /// Band-passed x, y and z in g on the working-rate grid.
    pub fn locomotion_band(&self, signal: &Signal) -> Result<[Vec<f64>; 3]> {
        let fs = self.config.target_sampling_freq_hz;
        let samples = signal.samples_in_g();
        let mut band: [Vec<f64>; 3] = Default::default();
        for (axis, out) in band.iter_mut().enumerate() {
            let column: Vec<f64> = samples.iter().map(|s| s[axis]).collect();
            let resampled = resample_linear(&column, signal.sampling_freq_hz(), fs);
            *out = self.conditioner.smooth(&resampled, fs)?;
        }
        Ok(band)
    }

    /// Activity envelope on the working-rate grid (`target_sampling_freq_hz`).
    pub fn activity_envelope(&self, signal: &Signal) -> Result<Vec<f64>> {
        let band = self.locomotion_band(signal)?;
        self.envelope_of(&band)
    }

    fn envelope_of(&self, band: &[Vec<f64>; 3]) -> Result<Vec<f64>> {
        let n = band.iter().map(Vec::len).min().unwrap_or(0);
        let vectors: Vec<[f64; 3]> = (0..n).map(|i| [band[0][i], band[1][i], band[2][i]]).collect();
        self.conditioner
            .envelope(&euclidean_norm(&vectors), self.config.target_sampling_freq_hz)
    }

    /// Keep the spans that hold at least `min_steps` steps.
    fn validate_steps(&self, band: &[Vec<f64>; 3], candidates: &[Span], spans: Vec<Span>) -> Vec<Span> {
        let cfg = &self.config;
        let fs = cfg.target_sampling_freq_hz;
        if cfg.min_steps == 0 {
            return spans;
        }
        let threshold = match cfg.step_threshold {
            StepThreshold::Fixed => cfg.step_threshold_g,
            StepThreshold::Adaptive => {
                let active = reject_short(candidates.to_vec(), cfg.min_duration_s, fs);
                adaptive_step_threshold(band, &active, cfg.adaptive_percentile, cfg.adaptive_fallback_g)
            }
        };
        let max_interval = (cfg.max_step_interval_s * fs).round() as usize;
        spans
            .into_iter()
            .filter(|span| {
                let steps = count_steps(
                    dominant_axis(band, span),
                    threshold,
                    max_interval,
                    cfg.min_pulse_steps,
                );
                debug!(
                    "GSD: span {:.2}-{:.2}s holds {steps} step(s) above {threshold:.3} g",
                    span.start as f64 / fs,
                    span.end as f64 / fs
                );
                steps >= cfg.min_steps
            })
            .collect()
    }

    /// Detect gait sequences, sorted by onset and non-overlapping.
    ///
    /// A flat signal, or one shorter than `min_duration_s`, yields an empty
    /// list. Errors only come from conditioning (see [`Conditioner::smooth`]).
    pub fn detect(&self, signal: &Signal) -> Result<Vec<GaitSequence>> {
        let cfg = &self.config;
        let fs = cfg.target_sampling_freq_hz;
        let signal_duration = signal.duration_s();

        if signal_duration < cfg.min_duration_s {
            debug!(
                "Signal of {signal_duration:.2}s is shorter than the minimum sequence ({:.2}s)",
                cfg.min_duration_s
            );
            return Ok(Vec::new());
        }

        let band = self.locomotion_band(signal)?;
        let envelope = self.envelope_of(&band)?;
        let candidates = active_spans(&envelope, cfg.activity_threshold_g);
        let merged = merge_spans(&candidates, cfg.min_gap_s, fs);
        let long = reject_short(merged.clone(), cfg.min_duration_s, fs);
        let long_count = long.len();
        let kept = self.validate_steps(&band, &candidates, long);
        debug!(
            "GSD: {} candidates, {} after merging, {long_count} long enough, {} with enough steps",
            candidates.len(),
            merged.len(),
            kept.len()
        );

        let sequences: Vec<GaitSequence> = kept
            .iter()
            .enumerate()
            .map(|(id, span)| {
                let onset = span.start as f64 / fs;
                let duration = (span.len() as f64 / fs).min(signal_duration - onset);
                GaitSequence::new(id, onset, duration)
            })
            .filter(|gs| gs.duration > 0.0)
            .collect();

        info!(
            "Detected {} gait sequence(s) in {signal_duration:.1}s of signal",
            sequences.len()
        );
        Ok(sequences)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::AccelUnit;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    /// 100 Hz signal: gravity on z, a 2 Hz vertical oscillation inside `walk`.
    fn walking_signal(total_s: f64, walks: &[(f64, f64)]) -> Signal {
        let fs = 100.0;
        let n = (total_s * fs) as usize;
        let samples = (0..n)
            .map(|i| {
                let t = i as f64 / fs;
                let walking = walks.iter().any(|&(a, b)| t >= a && t < b);
                let gait = if walking {
                    0.3 * (2.0 * PI * 2.0 * t).sin()
                } else {
                    0.0
                };
                let noise = 0.003 * (2.0 * PI * 13.7 * t).sin();
                [0.01, 0.02, 1.0 + gait + noise]
            })
            .collect();
        Signal::new(samples, fs, AccelUnit::G).unwrap()
    }

    #[test]
    fn test_active_spans_inclusive_threshold() {
        let env = [0.0, 0.5, 0.5, 0.4, 0.6, 0.6];
        let spans = active_spans(&env, 0.5);
        assert_eq!(
            spans,
            vec![Span { start: 1, end: 3 }, Span { start: 4, end: 6 }]
        );
        assert!(active_spans(&[0.0; 10], 0.1).is_empty());
    }

    #[test]
    fn test_merge_short_gap() {
        // 0.3 s gap at 40 Hz, minimum gap 0.5 s
        let fs = 40.0;
        let spans = [Span { start: 0, end: 40 }, Span { start: 52, end: 200 }];
        let merged = merge_spans(&spans, 0.5, fs);
        assert_eq!(merged, vec![Span { start: 0, end: 200 }]);
    }

    #[test]
    fn test_no_merge_long_gap() {
        let fs = 40.0;
        let spans = [Span { start: 0, end: 40 }, Span { start: 80, end: 200 }];
        let merged = merge_spans(&spans, 0.5, fs);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_merge_gap_equal_to_limit() {
        let fs = 40.0;
        let spans = [Span { start: 0, end: 40 }, Span { start: 60, end: 100 }];
        assert_eq!(merge_spans(&spans, 0.5, fs).len(), 1);
    }

    #[test]
    fn test_reject_short() {
        let fs = 40.0;
        let spans = vec![Span { start: 0, end: 100 }, Span { start: 200, end: 400 }];
        let kept = reject_short(spans, 3.0, fs);
        assert_eq!(kept, vec![Span { start: 200, end: 400 }]);
    }

    #[test]
    fn test_single_walking_bout() {
        let signal = walking_signal(60.0, &[(25.0, 35.0)]);
        let gsd = GaitSequenceDetector::default();
        let sequences = gsd.detect(&signal).unwrap();

        assert_eq!(sequences.len(), 1, "{sequences:?}");
        let gs = sequences[0];
        assert_abs_diff_eq!(gs.duration, 10.0, epsilon = 2.0);
        assert_abs_diff_eq!(gs.onset, 25.0, epsilon = 1.0);
        assert_eq!(gs.id, 0);
    }

    #[test]
    fn test_all_zero_signal_is_empty() {
        let signal = Signal::new(vec![[0.0; 3]; 6000], 100.0, AccelUnit::G).unwrap();
        let sequences = GaitSequenceDetector::default().detect(&signal).unwrap();
        assert!(sequences.is_empty());
    }

    #[test]
    fn test_standing_still_is_empty() {
        let signal = Signal::new(vec![[0.0, 0.0, 1.0]; 6000], 100.0, AccelUnit::G).unwrap();
        assert!(GaitSequenceDetector::default()
            .detect(&signal)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_signal_shorter_than_minimum_is_empty() {
        let signal = walking_signal(2.0, &[(0.0, 2.0)]);
        assert!(GaitSequenceDetector::default()
            .detect(&signal)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_short_pause_merges_bouts() {
        let signal = walking_signal(90.0, &[(20.0, 35.0), (36.5, 50.0)]);
        let sequences = GaitSequenceDetector::default().detect(&signal).unwrap();
        assert_eq!(sequences.len(), 1);
        assert!(sequences[0].duration > 25.0);
    }

    #[test]
    fn test_long_pause_separates_bouts() {
        let signal = walking_signal(120.0, &[(10.0, 30.0), (60.0, 80.0)]);
        let sequences = GaitSequenceDetector::default().detect(&signal).unwrap();
        assert_eq!(sequences.len(), 2);
        assert!(sequences[0].end() <= sequences[1].onset);
        assert_eq!(sequences[1].id, 1);
    }

    #[test]
    fn test_brief_burst_is_rejected() {
        let signal = walking_signal(60.0, &[(30.0, 31.0)]);
        assert!(GaitSequenceDetector::default()
            .detect(&signal)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_unit_invariance() {
        let g = walking_signal(60.0, &[(25.0, 35.0)]);
        let ms2: Vec<[f64; 3]> = g
            .samples()
            .iter()
            .map(|s| s.map(|v| v * crate::types::STANDARD_GRAVITY))
            .collect();
        let ms2 = Signal::new(ms2, 100.0, AccelUnit::MetersPerSecondSquared).unwrap();
        let gsd = GaitSequenceDetector::default();
        let a = gsd.detect(&g).unwrap();
        let b = gsd.detect(&ms2).unwrap();
        assert_eq!(a.len(), b.len());
        assert_abs_diff_eq!(a[0].onset, b[0].onset, epsilon = 0.05);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = GaitSequenceConfig {
            activity_threshold_g: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            GaitSequenceDetector::new(config),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_gravity_free_walking_detected() {
        let fs = 100.0;
        let samples: Vec<[f64; 3]> = (0..6000)
            .map(|i| {
                let t = i as f64 / fs;
                let noise = 0.002 * (2.0 * PI * 17.3 * t).sin();
                let gait = if (25.0..35.0).contains(&t) {
                    0.3 * (2.0 * PI * 2.0 * t).sin()
                } else {
                    0.0
                };
                [noise, -noise, gait + noise]
            })
            .collect();
        let signal = Signal::new(samples, fs, AccelUnit::G).unwrap();
        let sequences = GaitSequenceDetector::default().detect(&signal).unwrap();
        assert_eq!(sequences.len(), 1, "{sequences:?}");
        assert_abs_diff_eq!(sequences[0].onset, 25.0, epsilon = 1.0);
        assert_abs_diff_eq!(sequences[0].duration, 10.0, epsilon = 2.0);
    }

    #[test]
    fn test_pulse_trains_split_on_long_interval() {
        assert_eq!(pulse_trains(&[0, 10, 20, 30, 100, 110], 15), vec![4, 2]);
        assert!(pulse_trains(&[], 15).is_empty());
    }

    #[test]
    fn test_count_steps_needs_both_polarities() {
        // ten cycles, peaks at +-1
        let x: Vec<f64> = (0..200).map(|i| (2.0 * PI * i as f64 / 20.0).sin()).collect();
        assert_eq!(count_steps(&x, 0.5, 25, 4), 10);
        assert_eq!(count_steps(&x, 1.5, 25, 4), 0);
        assert_eq!(count_steps(&x, 0.5, 25, 11), 0);

        let positive_only: Vec<f64> = x.iter().map(|v| v.max(0.0)).collect();
        assert_eq!(count_steps(&positive_only, 0.5, 25, 4), 0);
    }

    #[test]
    fn test_percentile_interpolates() {
        let v = [5.0, 1.0, 3.0, 2.0, 4.0];
        assert_eq!(percentile(&v, 0.0), Some(1.0));
        assert_eq!(percentile(&v, 25.0), Some(2.0));
        assert_eq!(percentile(&v, 50.0), Some(3.0));
        assert_eq!(percentile(&v, 100.0), Some(5.0));
        assert_abs_diff_eq!(percentile(&v, 10.0).unwrap(), 1.4, epsilon = 1e-12);
        assert_eq!(percentile(&[], 5.0), None);
    }

    #[test]
    fn test_adaptive_threshold_and_fallback() {
        let wave: Vec<f64> = (0..400).map(|i| 0.3 * (2.0 * PI * i as f64 / 20.0).sin()).collect();
        let band = [vec![0.0; 400], vec![0.0; 400], wave];
        let span = Span { start: 0, end: 400 };
        let threshold = adaptive_step_threshold(&band, &[span], 5.0, 0.15);
        assert_abs_diff_eq!(threshold, 0.3, epsilon = 1e-9);
        assert_eq!(adaptive_step_threshold(&band, &[], 5.0, 0.15), 0.15);
    }

    #[test]
    fn test_adaptive_mode_detects_walking() {
        let config = GaitSequenceConfig {
            step_threshold: StepThreshold::Adaptive,
            ..Default::default()
        };
        let sequences = GaitSequenceDetector::new(config)
            .unwrap()
            .detect(&walking_signal(60.0, &[(25.0, 35.0)]))
            .unwrap();
        assert_eq!(sequences.len(), 1);
        assert_abs_diff_eq!(sequences[0].onset, 25.0, epsilon = 1.0);
    }

    #[test]
    fn test_sequences_need_enough_steps() {
        // ten seconds at 2 steps/s
        let signal = walking_signal(60.0, &[(25.0, 35.0)]);
        let detect = |min_steps| {
            let config = GaitSequenceConfig {
                min_steps,
                ..Default::default()
            };
            GaitSequenceDetector::new(config).unwrap().detect(&signal).unwrap()
        };
        assert_eq!(detect(15).len(), 1);
        assert!(detect(40).is_empty());
        assert_eq!(detect(0).len(), 1);
    }
}
