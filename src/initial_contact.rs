//! Initial contact detection.
//!
//! Locates heel-strike instants inside each gait sequence using:
//! - Vertical axis selection (gravity-dominant axis, oriented upward)
//! - Detrending and zero-phase low-pass filtering
//! - A Gaussian-derivative transform that turns the impact into a sharp
//!   positive peak (the upward jerk when the foot stops the body's descent)
//! - Peak picking with a prominence threshold and a refractory period
//!
//! Each gait sequence is processed on its own sample range; a contact never
//! depends on samples of another sequence. Peak search is linear in the
//! sequence length apart from a bounded prominence window per peak.

use log::{debug, info};

use crate::config::{InitialContactConfig, VerticalAxis};
use crate::error::{Error, Result};
use crate::signal::{gaussian_derivative, Conditioner, SignalConditioner};
use crate::types::{GaitSequence, InitialContact, Signal};

/// Indices of strict local maxima. Flat-topped peaks resolve to their middle sample.
pub fn local_maxima(x: &[f64]) -> Vec<usize> {
    let n = x.len();
    let mut peaks = Vec::new();
    if n < 3 {
        return peaks;
    }
    let last = n - 1;
    let mut i = 1;
    while i < last {
        if x[i - 1] < x[i] {
            let mut ahead = i + 1;
            while ahead < last && x[ahead] == x[i] {
                ahead += 1;
            }
            if x[ahead] < x[i] {
                peaks.push((i + ahead - 1) / 2);
                i = ahead;
            }
        }
        i += 1;
    }
    peaks
}

/// Prominence of `peak`, searching at most `wlen` samples to each side.
///
/// The search on each side stops at the first sample higher than the peak.
pub fn prominence(x: &[f64], peak: usize, wlen: usize) -> f64 {
    let height = x[peak];
    let lo = peak.saturating_sub(wlen);
    let hi = (peak + wlen).min(x.len() - 1);

    let mut left_min = height;
    for &v in x[lo..peak].iter().rev() {
        if v > height {
            break;
        }
        left_min = left_min.min(v);
    }
    let mut right_min = height;
    for &v in &x[peak + 1..=hi] {
        if v > height {
            break;
        }
        right_min = right_min.min(v);
    }
    height - left_min.max(right_min)
}

/// Enforce a minimum spacing between peaks, keeping higher peaks first.
///
/// `peaks` must be sorted. Equal heights favour the earlier peak. Returns the
/// surviving peaks in index order.
pub fn select_by_distance(x: &[f64], peaks: &[usize], distance: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..peaks.len()).collect();
    // Stable sort keeps earlier peaks ahead on ties.
    order.sort_by(|&a, &b| x[peaks[b]].total_cmp(&x[peaks[a]]));

    let mut keep = vec![true; peaks.len()];
    for &i in &order {
        if !keep[i] {
            continue;
        }
        let mut j = i;
        while j > 0 && peaks[i] - peaks[j - 1] < distance {
            keep[j - 1] = false;
            j -= 1;
        }
        let mut j = i + 1;
        while j < peaks.len() && peaks[j] - peaks[i] < distance {
            keep[j] = false;
            j += 1;
        }
    }
    peaks
        .iter()
        .zip(keep)
        .filter_map(|(&p, k)| k.then_some(p))
        .collect()
}

/// Sample range `[start, end)` of a gait sequence.
///
/// Uses ceilings on both ends so every sample time lies inside
/// `[onset, onset + duration)`.
fn sample_range(gs: &GaitSequence, signal: &Signal) -> Result<(usize, usize)> {
    let fs = signal.sampling_freq_hz();
    let signal_duration = signal.duration_s();
    let out_of_range = || Error::InvalidInterval {
        id: gs.id,
        onset: gs.onset,
        duration: gs.duration,
        signal_duration,
    };

    if !gs.onset.is_finite() || !gs.duration.is_finite() || gs.onset < 0.0 || gs.duration <= 0.0
    {
        return Err(out_of_range());
    }
    // One sample period of slack for sequences detected on a coarser grid.
    if gs.end() > signal_duration + 1.0 / fs {
        return Err(out_of_range());
    }
    let start = (gs.onset * fs).ceil() as usize;
    let end = ((gs.end() * fs).ceil() as usize).min(signal.len());
    Ok((start.min(end), end))
}

/// Initial contact detector.
#[derive(Debug, Clone)]
pub struct InitialContactDetector<C: Conditioner = SignalConditioner> {
    config: InitialContactConfig,
    conditioner: C,
}

impl InitialContactDetector<SignalConditioner> {
    /// Create a detector with the Butterworth low-pass described by `config`.
    pub fn new(config: InitialContactConfig) -> Result<Self> {
        let conditioner = SignalConditioner::lowpass(config.filter_order, config.lowpass_cutoff_hz);
        Self::with_conditioner(config, conditioner)
    }
}

impl Default for InitialContactDetector<SignalConditioner> {
    fn default() -> Self {
        let config = InitialContactConfig::default();
        Self {
            conditioner: SignalConditioner::lowpass(config.filter_order, config.lowpass_cutoff_hz),
            config,
        }
    }
}

impl<C: Conditioner> InitialContactDetector<C> {
    /// Create a detector with a custom conditioner.
    pub fn with_conditioner(config: InitialContactConfig, conditioner: C) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            conditioner,
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &InitialContactConfig {
        &self.config
    }

    /// Check that the conditioner can run at `sampling_freq_hz`.
    ///
    /// Fails with [`Error::InvalidConfig`] when the low-pass cutoff is not
    /// below the Nyquist frequency, whatever the recording contains.
    pub fn check_sampling_rate(&self, sampling_freq_hz: f64) -> Result<()> {
        self.conditioner.min_len(sampling_freq_hz).map(|_| ())
    }

    /// Detect initial contacts inside every gait sequence.
    ///
    /// The sampling rate and all sequences are checked before any filtering,
    /// so an unusable rate fails with [`Error::InvalidConfig`] and a corrupt
    /// sequence list with [`Error::InvalidInterval`], without partial output.
    /// Contacts are returned sorted by onset.
    pub fn detect(&self, signal: &Signal, sequences: &[GaitSequence]) -> Result<Vec<InitialContact>> {
        self.check_sampling_rate(signal.sampling_freq_hz())?;
        if sequences.is_empty() {
            return Ok(Vec::new());
        }
        let ranges = sequences
            .iter()
            .map(|gs| sample_range(gs, signal))
            .collect::<Result<Vec<_>>>()?;

        let samples = signal.samples_in_g();
        let mut contacts = Vec::new();
        for (gs, (start, end)) in sequences.iter().zip(ranges) {
            let found = self.detect_in_range(&samples[start..end], signal.sampling_freq_hz())?;
            let before = contacts.len();
            contacts.extend(
                found
                    .into_iter()
                    .map(|idx| InitialContact::new((start + idx) as f64 / signal.sampling_freq_hz(), gs.id))
                    .filter(|ic| gs.contains(ic.onset)),
            );
            debug!(
                "ICD: gait sequence {} ({:.2}s) -> {} contacts",
                gs.id,
                gs.duration,
                contacts.len() - before
            );
        }
        contacts.sort_by(|a, b| a.onset.total_cmp(&b.onset));
        info!(
            "Detected {} initial contact(s) in {} gait sequence(s)",
            contacts.len(),
            sequences.len()
        );
        Ok(contacts)
    }

    /// Contact indices relative to the start of `segment`.
    fn detect_in_range(&self, segment: &[[f64; 3]], fs: f64) -> Result<Vec<usize>> {
        let cfg = &self.config;
        let distance = (cfg.min_contact_interval_s * fs).ceil().max(1.0) as usize;
        if segment.len() < self.conditioner.min_len(fs)? || segment.len() < 2 * distance {
            return Ok(Vec::new());
        }

        let vertical = vertical_component(segment, cfg.vertical_axis);
        let mean = vertical.iter().sum::<f64>() / vertical.len() as f64;
        let detrended: Vec<f64> = vertical.iter().map(|v| v - mean).collect();

        let filtered = self.conditioner.smooth(&detrended, fs)?;
        let transient = gaussian_derivative(&filtered, cfg.wavelet_sigma_s * fs, fs);

        let candidates: Vec<usize> = local_maxima(&transient)
            .into_iter()
            .filter(|&p| prominence(&transient, p, distance) >= cfg.min_prominence)
            .collect();
        Ok(select_by_distance(&transient, &candidates, distance))
    }
}

/// Vertical acceleration, signed so that gravity reads positive.
fn vertical_component(segment: &[[f64; 3]], axis: VerticalAxis) -> Vec<f64> {
    let n = segment.len() as f64;
    let means: [f64; 3] =
        std::array::from_fn(|a| segment.iter().map(|s| s[a]).sum::<f64>() / n);
    let axis = match axis {
        VerticalAxis::X => 0,
        VerticalAxis::Y => 1,
        VerticalAxis::Z => 2,
        VerticalAxis::Auto => (0..3).fold(0, |best, a| {
            if means[a].abs() > means[best].abs() {
                a
            } else {
                best
            }
        }),
    };
    let sign = if means[axis] < 0.0 { -1.0 } else { 1.0 };
    segment.iter().map(|s| sign * s[axis]).collect()
}
