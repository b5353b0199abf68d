//! Signal conditioning primitives shared by all detectors.
//!
//! This module provides the low-level processing every detector builds on:
//! - Euclidean norm across the three axes
//! - Butterworth low-pass / high-pass / band-pass design for any sampling rate
//! - Zero-phase (forward-backward) filtering
//! - Moving-RMS activity envelope
//! - Gaussian smoothing and Gaussian-derivative transform
//! - Linear resampling
//!
//! Design note: Filter coefficients are always derived from the
//! cutoff-to-Nyquist ratio of the signal at hand, never hardcoded for one
//! rate. Every routine is a pure function of its input and runs in linear
//! time (the Gaussian routines in `O(n · kernel)`), so day-long recordings
//! stay tractable.
//!
//! Why zero-phase matters:
//! A causal IIR filter delays the signal by a frequency-dependent amount,
//! which would shift every gait onset and contact timestamp. Running the
//! filter forward and then backward cancels the phase response exactly.

use std::f64::consts::PI;

use crate::error::{Error, Result};

/// Sample-wise Euclidean norm `sqrt(x² + y² + z²)`.
pub fn euclidean_norm(samples: &[[f64; 3]]) -> Vec<f64> {
    samples
        .iter()
        .map(|s| (s[0] * s[0] + s[1] * s[1] + s[2] * s[2]).sqrt())
        .collect()
}

fn ensure_finite(signal: &[f64]) -> Result<()> {
    match signal.iter().position(|v| !v.is_finite()) {
        Some(pos) => Err(Error::InvalidSignal(format!(
            "non-finite value at index {pos}"
        ))),
        None => Ok(()),
    }
}

// ============================================================================
// Butterworth design
// ============================================================================

/// Frequency response shape of a filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterBand {
    /// Pass below `cutoff_hz`.
    LowPass {
        /// Cutoff frequency (Hz).
        cutoff_hz: f64,
    },
    /// Pass above `cutoff_hz`.
    HighPass {
        /// Cutoff frequency (Hz).
        cutoff_hz: f64,
    },
    /// Pass between `low_hz` and `high_hz` (high-pass then low-pass cascade).
    BandPass {
        /// Lower edge (Hz).
        low_hz: f64,
        /// Upper edge (Hz).
        high_hz: f64,
    },
}

/// One second-order section in transposed direct form II.
///
/// First-order sections are stored with `b2 = a2 = 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Biquad {
    /// Gain at DC, used to start the section in steady state.
    fn dc_gain(&self) -> f64 {
        (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2)
    }

    /// Second-order analog section `1 / (s² + d·s + 1)` under the bilinear transform.
    fn second_order(k: f64, damping: f64, highpass: bool) -> Self {
        let k2 = k * k;
        let norm = 1.0 / (1.0 + damping * k + k2);
        let a1 = 2.0 * (k2 - 1.0) * norm;
        let a2 = (1.0 - damping * k + k2) * norm;
        if highpass {
            Self {
                b0: norm,
                b1: -2.0 * norm,
                b2: norm,
                a1,
                a2,
            }
        } else {
            let b0 = k2 * norm;
            Self {
                b0,
                b1: 2.0 * b0,
                b2: b0,
                a1,
                a2,
            }
        }
    }

    /// First-order analog section `1 / (s + 1)` under the bilinear transform.
    fn first_order(k: f64, highpass: bool) -> Self {
        let norm = 1.0 / (1.0 + k);
        let a1 = (k - 1.0) * norm;
        if highpass {
            Self {
                b0: norm,
                b1: -norm,
                b2: 0.0,
                a1,
                a2: 0.0,
            }
        } else {
            Self {
                b0: k * norm,
                b1: k * norm,
                b2: 0.0,
                a1,
                a2: 0.0,
            }
        }
    }
}

/// A Butterworth filter realised as cascaded second-order sections.
#[derive(Debug, Clone, PartialEq)]
pub struct Butterworth {
    sections: Vec<Biquad>,
    poles: usize,
}

impl Butterworth {
    /// Design a filter of the given order for a sampling rate.
    ///
    /// For a band-pass, `order` applies to each edge, so the result has
    /// `2 · order` poles. Cutoffs must lie strictly inside `(0, fs / 2)`.
    pub fn design(order: usize, band: FilterBand, sampling_freq_hz: f64) -> Result<Self> {
        if order == 0 {
            return Err(Error::InvalidConfig("filter order must be >= 1".to_string()));
        }
        if !sampling_freq_hz.is_finite() || sampling_freq_hz <= 0.0 {
            return Err(Error::InvalidSignal(format!(
                "sampling frequency must be a positive number, got {sampling_freq_hz}"
            )));
        }
        let nyquist = sampling_freq_hz / 2.0;
        let check = |cutoff: f64| -> Result<f64> {
            if cutoff.is_finite() && cutoff > 0.0 && cutoff < nyquist {
                // Pre-warped analog cutoff
                Ok((PI * cutoff / sampling_freq_hz).tan())
            } else {
                Err(Error::InvalidConfig(format!(
                    "cutoff {cutoff} Hz must lie in (0, {nyquist}) for a {sampling_freq_hz} Hz signal"
                )))
            }
        };

        let sections = match band {
            FilterBand::LowPass { cutoff_hz } => Self::sections(order, check(cutoff_hz)?, false),
            FilterBand::HighPass { cutoff_hz } => Self::sections(order, check(cutoff_hz)?, true),
            FilterBand::BandPass { low_hz, high_hz } => {
                if low_hz >= high_hz {
                    return Err(Error::InvalidConfig(format!(
                        "band-pass lower edge {low_hz} Hz must be below upper edge {high_hz} Hz"
                    )));
                }
                let mut sections = Self::sections(order, check(low_hz)?, true);
                sections.extend(Self::sections(order, check(high_hz)?, false));
                sections
            }
        };
        let poles = match band {
            FilterBand::BandPass { .. } => 2 * order,
            _ => order,
        };
        Ok(Self { sections, poles })
    }

    /// Butterworth poles paired into sections with damping `2 sin(π(2k+1)/(2N))`.
    fn sections(order: usize, k: f64, highpass: bool) -> Vec<Biquad> {
        let mut sections: Vec<Biquad> = (0..order / 2)
            .map(|i| {
                let phi = PI * (2 * i + 1) as f64 / (2 * order) as f64;
                Biquad::second_order(k, 2.0 * phi.sin(), highpass)
            })
            .collect();
        if order % 2 == 1 {
            sections.push(Biquad::first_order(k, highpass));
        }
        sections
    }

    /// Number of samples padded on each side by [`Butterworth::filtfilt`].
    pub fn padlen(&self) -> usize {
        3 * (self.poles + 1)
    }

    /// Shortest signal [`Butterworth::filtfilt`] accepts.
    pub fn min_len(&self) -> usize {
        self.padlen() + 1
    }

    /// Causal filtering, starting every section in steady state for `x[0]`.
    pub fn filter(&self, signal: &[f64]) -> Vec<f64> {
        let mut data = signal.to_vec();
        let Some(&first) = signal.first() else {
            return data;
        };
        let mut level = first;
        for s in &self.sections {
            let g = s.dc_gain();
            let mut z1 = (g - s.b0) * level;
            let mut z2 = (s.b2 - s.a2 * g) * level;
            for v in data.iter_mut() {
                let x = *v;
                let y = s.b0 * x + z1;
                z1 = s.b1 * x - s.a1 * y + z2;
                z2 = s.b2 * x - s.a2 * y;
                *v = y;
            }
            level *= g;
        }
        data
    }

    /// Zero-phase filtering: forward pass, backward pass, odd-extension padding.
    ///
    /// Fails with [`Error::InvalidSignal`] on non-finite input or when the
    /// signal is not longer than the padding.
    pub fn filtfilt(&self, signal: &[f64]) -> Result<Vec<f64>> {
        ensure_finite(signal)?;
        let pad = self.padlen();
        let n = signal.len();
        if n <= pad {
            return Err(Error::InvalidSignal(format!(
                "{n} samples is too short for a {}-pole zero-phase filter (needs more than {pad})",
                self.poles
            )));
        }

        let first = signal[0];
        let last = signal[n - 1];
        let mut ext = Vec::with_capacity(n + 2 * pad);
        ext.extend((1..=pad).rev().map(|i| 2.0 * first - signal[i]));
        ext.extend_from_slice(signal);
        ext.extend((1..=pad).map(|i| 2.0 * last - signal[n - 1 - i]));

        let mut y = self.filter(&ext);
        y.reverse();
        let mut y = self.filter(&y);
        y.reverse();
        Ok(y[pad..pad + n].to_vec())
    }
}

// ============================================================================
// Envelope, smoothing, resampling
// ============================================================================

/// Centered moving RMS over `window` samples.
///
/// Near the edges the window is truncated to the samples available. Uses
/// prefix sums, so the cost does not depend on the window length.
pub fn moving_rms(signal: &[f64], window: usize) -> Vec<f64> {
    let n = signal.len();
    let window = window.max(1);
    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0);
    let mut acc = 0.0;
    for v in signal {
        acc += v * v;
        prefix.push(acc);
    }
    let before = (window - 1) / 2;
    let after = window / 2;
    (0..n)
        .map(|i| {
            let lo = i.saturating_sub(before);
            let hi = (i + after + 1).min(n);
            let mean_sq = (prefix[hi] - prefix[lo]) / (hi - lo) as f64;
            mean_sq.max(0.0).sqrt()
        })
        .collect()
}

fn gaussian_kernel(sigma_samples: f64) -> Vec<f64> {
    let radius = (4.0 * sigma_samples).ceil().max(1.0) as usize;
    let two_var = 2.0 * sigma_samples * sigma_samples;
    let mut kernel: Vec<f64> = (0..=2 * radius)
        .map(|i| {
            let d = i as f64 - radius as f64;
            (-d * d / two_var).exp()
        })
        .collect();
    let sum: f64 = kernel.iter().sum();
    for k in kernel.iter_mut() {
        *k /= sum;
    }
    kernel
}

/// Gaussian smoothing with edge samples repeated outward.
pub fn gaussian_smooth(signal: &[f64], sigma_samples: f64) -> Vec<f64> {
    let n = signal.len();
    if n == 0 || sigma_samples.is_nan() || sigma_samples <= 0.0 {
        return signal.to_vec();
    }
    let kernel = gaussian_kernel(sigma_samples);
    let radius = (kernel.len() / 2) as isize;
    let last = n as isize - 1;
    (0..n as isize)
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .map(|(j, w)| {
                    let idx = (i + j as isize - radius).clamp(0, last) as usize;
                    w * signal[idx]
                })
                .sum()
        })
        .collect()
}

/// Time derivative of the Gaussian-smoothed signal, in units per second.
///
/// Acts as a single-scale derivative-of-Gaussian wavelet: it emphasises sharp
/// transients at the scale of `sigma_samples` and suppresses slower drift.
pub fn gaussian_derivative(signal: &[f64], sigma_samples: f64, sampling_freq_hz: f64) -> Vec<f64> {
    let smoothed = gaussian_smooth(signal, sigma_samples);
    let n = smoothed.len();
    if n < 2 {
        return vec![0.0; n];
    }
    let mut out = Vec::with_capacity(n);
    out.push((smoothed[1] - smoothed[0]) * sampling_freq_hz);
    for i in 1..n - 1 {
        out.push((smoothed[i + 1] - smoothed[i - 1]) * 0.5 * sampling_freq_hz);
    }
    out.push((smoothed[n - 1] - smoothed[n - 2]) * sampling_freq_hz);
    out
}

/// Linear-interpolation resampling from `from_hz` to `to_hz`.
///
/// Output sample `i` sits at `i / to_hz` seconds; the last output sample does
/// not extend beyond the last input sample.
pub fn resample_linear(signal: &[f64], from_hz: f64, to_hz: f64) -> Vec<f64> {
    let n = signal.len();
    if n < 2 || from_hz == to_hz {
        return signal.to_vec();
    }
    let span_s = (n - 1) as f64 / from_hz;
    let n_out = (span_s * to_hz).floor() as usize + 1;
    let ratio = from_hz / to_hz;
    (0..n_out)
        .map(|i| {
            let pos = i as f64 * ratio;
            let lo = (pos.floor() as usize).min(n - 1);
            let hi = (lo + 1).min(n - 1);
            let frac = pos - lo as f64;
            signal[lo] + (signal[hi] - signal[lo]) * frac
        })
        .collect()
}

// ============================================================================
// Conditioner capability
// ============================================================================

/// The conditioning capability detectors depend on.
///
/// Detectors hold a value implementing this trait rather than inheriting
/// from a filter type, so alternative conditioners can be swapped in for
/// validation against reference datasets.
pub trait Conditioner {
    /// Zero-phase smoothing of a 1-D signal.
    fn smooth(&self, signal: &[f64], sampling_freq_hz: f64) -> Result<Vec<f64>>;

    /// Coarse-scale activity envelope of a 1-D signal.
    fn envelope(&self, signal: &[f64], sampling_freq_hz: f64) -> Result<Vec<f64>>;

    /// Shortest signal `smooth` accepts at this rate.
    fn min_len(&self, sampling_freq_hz: f64) -> Result<usize>;
}

/// Butterworth-based conditioner with a moving-RMS envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalConditioner {
    /// Filter response used by `smooth`.
    pub band: FilterBand,
    /// Butterworth order (per edge for band-pass).
    pub order: usize,
    /// Envelope window (s).
    pub envelope_window_s: f64,
}

impl SignalConditioner {
    /// Low-pass conditioner.
    pub fn lowpass(order: usize, cutoff_hz: f64) -> Self {
        Self {
            band: FilterBand::LowPass { cutoff_hz },
            order,
            envelope_window_s: 1.0,
        }
    }

    /// Band-pass conditioner.
    pub fn bandpass(order: usize, low_hz: f64, high_hz: f64) -> Self {
        Self {
            band: FilterBand::BandPass { low_hz, high_hz },
            order,
            envelope_window_s: 1.0,
        }
    }

    /// Set the envelope window.
    pub fn with_envelope_window(mut self, window_s: f64) -> Self {
        self.envelope_window_s = window_s;
        self
    }

    /// Filter designed for a given sampling rate.
    pub fn filter_for(&self, sampling_freq_hz: f64) -> Result<Butterworth> {
        Butterworth::design(self.order, self.band, sampling_freq_hz)
    }
}

impl Conditioner for SignalConditioner {
    fn smooth(&self, signal: &[f64], sampling_freq_hz: f64) -> Result<Vec<f64>> {
        self.filter_for(sampling_freq_hz)?.filtfilt(signal)
    }

    fn envelope(&self, signal: &[f64], sampling_freq_hz: f64) -> Result<Vec<f64>> {
        ensure_finite(signal)?;
        let window = (self.envelope_window_s * sampling_freq_hz).round().max(1.0) as usize;
        Ok(moving_rms(signal, window))
    }

    fn min_len(&self, sampling_freq_hz: f64) -> Result<usize> {
        Ok(self.filter_for(sampling_freq_hz)?.min_len())
    }
}
