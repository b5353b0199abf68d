//! Detector configuration.
//!
//! Every detector takes an explicit, typed configuration section. Sections
//! deserialize from TOML with per-field defaults and reject unknown keys, so a
//! misspelled option fails loudly instead of silently falling back to a
//! default. Each section has a `validate()` that detector constructors call
//! before any signal is touched.
//!
//! ```toml
//! [gait_sequence]
//! min_gap_s = 3.0
//!
//! [initial_contact]
//! vertical_axis = "x"
//!
//! [activity]
//! sampling_freq_hz = 100.0
//! epoch_duration_sec = 5
//! acceleration_unit = "g"
//! thresholds_mg = { sedentary_threshold = 45.0, light_threshold = 100.0, moderate_threshold = 400.0 }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{AccelUnit, ActivityLevel};

fn require_positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!(
            "{name} must be a positive number, got {value}"
        )))
    }
}

fn require_order(name: &str, order: usize) -> Result<()> {
    if (1..=MAX_FILTER_ORDER).contains(&order) {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!(
            "{name} must be in 1..={MAX_FILTER_ORDER}, got {order}"
        )))
    }
}

/// Highest Butterworth order accepted by any section.
pub const MAX_FILTER_ORDER: usize = 10;

// ============================================================================
// Gait sequence detection
// ============================================================================

/// How the step-peak threshold is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepThreshold {
    /// Use `step_threshold_g` as is.
    #[default]
    Fixed,
    /// Take a percentile of the peak magnitudes found in the active regions.
    Adaptive,
}

/// Parameters for gait sequence detection.
///
/// Defaults are tuned for a lower-back sensor. All thresholds are expressed
/// after resampling to `target_sampling_freq_hz`, so they do not depend on the
/// recording's native rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GaitSequenceConfig {
    /// Rate each axis is resampled to before filtering (Hz).
    pub target_sampling_freq_hz: f64,

    /// Lower edge of the locomotion band (Hz). Removes gravity and posture drift.
    pub band_low_hz: f64,

    /// Upper edge of the locomotion band (Hz). Step cadence rarely exceeds 3 Hz.
    pub band_high_hz: f64,

    /// Butterworth order of each band edge.
    pub filter_order: usize,

    /// Moving-RMS window for the activity envelope (s).
    pub envelope_window_s: f64,

    /// Envelope level at or above which a sample counts as active (g).
    pub activity_threshold_g: f64,

    /// Candidates separated by at most this gap are merged (s).
    pub min_gap_s: f64,

    /// Merged sequences shorter than this are discarded (s).
    pub min_duration_s: f64,

    /// Fixed or data-adaptive step-peak threshold.
    pub step_threshold: StepThreshold,

    /// Step-peak threshold in fixed mode (g).
    pub step_threshold_g: f64,

    /// Percentile of the active-region peak magnitudes used in adaptive mode.
    pub adaptive_percentile: f64,

    /// Adaptive threshold when the active regions hold no peaks (g).
    pub adaptive_fallback_g: f64,

    /// Peaks further apart than this start a new pulse train (s).
    pub max_step_interval_s: f64,

    /// Pulse trains with fewer peaks do not count as steps.
    pub min_pulse_steps: usize,

    /// Sequences with fewer steps are discarded. 0 turns step validation off.
    pub min_steps: usize,
}

impl Default for GaitSequenceConfig {
    fn default() -> Self {
        Self {
            target_sampling_freq_hz: 40.0,
            band_low_hz: 0.5,
            band_high_hz: 3.0,
            filter_order: 4,
            envelope_window_s: 1.0,
            activity_threshold_g: 0.05,
            min_gap_s: 3.0,
            min_duration_s: 3.0,
            step_threshold: StepThreshold::Fixed,
            step_threshold_g: 0.05,
            adaptive_percentile: 5.0,
            adaptive_fallback_g: 0.15,
            max_step_interval_s: 2.0,
            min_pulse_steps: 4,
            min_steps: 5,
        }
    }
}

impl GaitSequenceConfig {
    /// Check ranges and band ordering.
    pub fn validate(&self) -> Result<()> {
        require_positive("target_sampling_freq_hz", self.target_sampling_freq_hz)?;
        require_positive("band_low_hz", self.band_low_hz)?;
        require_positive("band_high_hz", self.band_high_hz)?;
        require_order("filter_order", self.filter_order)?;
        require_positive("envelope_window_s", self.envelope_window_s)?;
        require_positive("activity_threshold_g", self.activity_threshold_g)?;
        require_positive("min_duration_s", self.min_duration_s)?;
        require_positive("step_threshold_g", self.step_threshold_g)?;
        require_positive("adaptive_fallback_g", self.adaptive_fallback_g)?;
        require_positive("max_step_interval_s", self.max_step_interval_s)?;
        if !(0.0..=100.0).contains(&self.adaptive_percentile) {
            return Err(Error::InvalidConfig(format!(
                "adaptive_percentile must be in [0, 100], got {}",
                self.adaptive_percentile
            )));
        }
        if self.min_pulse_steps == 0 {
            return Err(Error::InvalidConfig(
                "min_pulse_steps must be at least 1".to_string(),
            ));
        }
        if !self.min_gap_s.is_finite() || self.min_gap_s < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "min_gap_s must be >= 0, got {}",
                self.min_gap_s
            )));
        }
        if self.band_low_hz >= self.band_high_hz {
            return Err(Error::InvalidConfig(format!(
                "band_low_hz ({}) must be below band_high_hz ({})",
                self.band_low_hz, self.band_high_hz
            )));
        }
        let nyquist = self.target_sampling_freq_hz / 2.0;
        if self.band_high_hz >= nyquist {
            return Err(Error::InvalidConfig(format!(
                "band_high_hz ({}) must be below the Nyquist frequency ({nyquist})",
                self.band_high_hz
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Initial contact detection
// ============================================================================

/// Which accelerometer axis carries the vertical component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerticalAxis {
    /// Pick the axis with the largest mean magnitude (gravity) per sequence.
    #[default]
    Auto,
    /// First column.
    X,
    /// Second column.
    Y,
    /// Third column.
    Z,
}

/// Parameters for initial contact detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InitialContactConfig {
    /// Axis treated as vertical.
    pub vertical_axis: VerticalAxis,

    /// Low-pass cutoff applied to the vertical axis (Hz).
    /// Must be below the recording's Nyquist frequency.
    pub lowpass_cutoff_hz: f64,

    /// Butterworth order of the low-pass stage.
    pub filter_order: usize,

    /// Width of the Gaussian-derivative transform (s).
    pub wavelet_sigma_s: f64,

    /// Refractory period between consecutive contacts (s).
    /// 0.25 s bounds cadence at 4 contacts per second (running).
    pub min_contact_interval_s: f64,

    /// Minimum peak prominence of the transient, in g/s.
    pub min_prominence: f64,
}

impl Default for InitialContactConfig {
    fn default() -> Self {
        Self {
            vertical_axis: VerticalAxis::Auto,
            lowpass_cutoff_hz: 10.0,
            filter_order: 4,
            wavelet_sigma_s: 0.05,
            min_contact_interval_s: 0.25,
            min_prominence: 0.5,
        }
    }
}

impl InitialContactConfig {
    /// Check ranges.
    pub fn validate(&self) -> Result<()> {
        require_positive("lowpass_cutoff_hz", self.lowpass_cutoff_hz)?;
        require_order("filter_order", self.filter_order)?;
        require_positive("wavelet_sigma_s", self.wavelet_sigma_s)?;
        require_positive("min_contact_interval_s", self.min_contact_interval_s)?;
        require_positive("min_prominence", self.min_prominence)?;
        Ok(())
    }
}

// ============================================================================
// Physical activity monitoring
// ============================================================================

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawThresholds {
    sedentary_threshold: f64,
    light_threshold: f64,
    moderate_threshold: f64,
}

/// Ordered ENMO cut points in milli-g.
///
/// Only constructible through [`ActivityThresholds::new`] (or deserialization,
/// which goes through it), so a value of this type is always strictly
/// increasing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawThresholds")]
pub struct ActivityThresholds {
    sedentary_threshold: f64,
    light_threshold: f64,
    moderate_threshold: f64,
}

impl ActivityThresholds {
    /// Validate and build thresholds: finite, non-negative, strictly increasing.
    pub fn new(sedentary: f64, light: f64, moderate: f64) -> Result<Self> {
        let cuts = [
            ("sedentary_threshold", sedentary),
            ("light_threshold", light),
            ("moderate_threshold", moderate),
        ];
        for (name, value) in cuts {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::InvalidThresholds(format!(
                    "{name} must be a finite, non-negative value in mg, got {value}"
                )));
            }
        }
        if !(sedentary < light && light < moderate) {
            return Err(Error::InvalidThresholds(format!(
                "cut points must be strictly increasing (sedentary {sedentary} < light {light} < moderate {moderate})"
            )));
        }
        Ok(Self {
            sedentary_threshold: sedentary,
            light_threshold: light,
            moderate_threshold: moderate,
        })
    }

    /// Upper bound of the sedentary level (mg).
    pub fn sedentary(&self) -> f64 {
        self.sedentary_threshold
    }

    /// Upper bound of the light level (mg).
    pub fn light(&self) -> f64 {
        self.light_threshold
    }

    /// Upper bound of the moderate level (mg).
    pub fn moderate(&self) -> f64 {
        self.moderate_threshold
    }

    /// Classify an ENMO value.
    ///
    /// Each level is a half-open range `[lower, upper)`, so a value exactly on
    /// a cut point belongs to the higher level.
    pub fn classify(&self, enmo_mg: f64) -> ActivityLevel {
        if enmo_mg < self.sedentary_threshold {
            ActivityLevel::Sedentary
        } else if enmo_mg < self.light_threshold {
            ActivityLevel::Light
        } else if enmo_mg < self.moderate_threshold {
            ActivityLevel::Moderate
        } else {
            ActivityLevel::Vigorous
        }
    }
}

impl TryFrom<RawThresholds> for ActivityThresholds {
    type Error = Error;

    fn try_from(raw: RawThresholds) -> Result<Self> {
        Self::new(
            raw.sedentary_threshold,
            raw.light_threshold,
            raw.moderate_threshold,
        )
    }
}

impl Default for ActivityThresholds {
    fn default() -> Self {
        Self {
            sedentary_threshold: 45.0,
            light_threshold: 100.0,
            moderate_threshold: 400.0,
        }
    }
}

/// What to do with epochs that hold fewer samples than a full epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartialEpochPolicy {
    /// Drop them from the epoch list and daily totals.
    #[default]
    Exclude,
    /// Keep them in the epoch list with `partial = true`; daily totals still skip them.
    Flag,
}

/// Parameters for physical activity monitoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ActivityConfig {
    /// Sampling frequency of the recording (Hz).
    pub sampling_freq_hz: f64,

    /// ENMO cut points (mg).
    pub thresholds_mg: ActivityThresholds,

    /// Epoch length (s).
    pub epoch_duration_sec: u32,

    /// Unit the recording is declared in; converted to g before ENMO.
    pub acceleration_unit: AccelUnit,

    /// Low-pass cutoff applied to the Euclidean norm (Hz).
    pub lowpass_cutoff_hz: f64,

    /// Butterworth order of the low-pass stage.
    pub filter_order: usize,

    /// Handling of incomplete epochs.
    pub partial_epochs: PartialEpochPolicy,

    /// Also compute the per-day hourly mean-ENMO profile.
    #[serde(alias = "plot")]
    pub hourly_profile: bool,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            sampling_freq_hz: 100.0,
            thresholds_mg: ActivityThresholds::default(),
            epoch_duration_sec: 5,
            acceleration_unit: AccelUnit::G,
            lowpass_cutoff_hz: 20.0,
            filter_order: 4,
            partial_epochs: PartialEpochPolicy::Exclude,
            hourly_profile: false,
        }
    }
}

impl ActivityConfig {
    /// Check ranges and that the cutoff lies below Nyquist.
    pub fn validate(&self) -> Result<()> {
        require_positive("sampling_freq_hz", self.sampling_freq_hz)?;
        require_positive("lowpass_cutoff_hz", self.lowpass_cutoff_hz)?;
        require_order("filter_order", self.filter_order)?;
        if self.epoch_duration_sec == 0 {
            return Err(Error::InvalidConfig(
                "epoch_duration_sec must be a positive integer".to_string(),
            ));
        }
        let nyquist = self.sampling_freq_hz / 2.0;
        if self.lowpass_cutoff_hz >= nyquist {
            return Err(Error::InvalidConfig(format!(
                "lowpass_cutoff_hz ({}) must be below the Nyquist frequency ({nyquist})",
                self.lowpass_cutoff_hz
            )));
        }
        // Re-check in case the struct was assembled field by field.
        ActivityThresholds::new(
            self.thresholds_mg.sedentary(),
            self.thresholds_mg.light(),
            self.thresholds_mg.moderate(),
        )?;
        Ok(())
    }

    /// Number of samples in a complete epoch.
    ///
    /// Rounded down, so a fractional rate never demands more samples than a
    /// gap-free epoch can hold.
    pub fn samples_per_epoch(&self) -> usize {
        (self.epoch_duration_sec as f64 * self.sampling_freq_hz + 1e-9).floor() as usize
    }
}

// ============================================================================
// Top-level configuration
// ============================================================================

/// All detector sections.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectionConfig {
    /// Gait sequence detection.
    pub gait_sequence: GaitSequenceConfig,
    /// Initial contact detection.
    pub initial_contact: InitialContactConfig,
    /// Physical activity monitoring.
    pub activity: ActivityConfig,
}

impl DetectionConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: DetectionConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        log::debug!("Loaded detection config from {}", path.as_ref().display());
        Self::from_toml_str(&text)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.gait_sequence.validate()?;
        self.initial_contact.validate()?;
        self.activity.validate()?;
        Ok(())
    }
}
