//! Error types for the detection core.

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Detection error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Input signal is empty, non-finite, or too short for stable filtering
    #[error("Invalid signal: {0}")]
    InvalidSignal(String),

    /// A gait sequence references samples outside the signal
    #[error(
        "Invalid interval: gait sequence {id} [{onset:.3}s, +{duration:.3}s) lies outside a {signal_duration:.3}s signal"
    )]
    InvalidInterval {
        /// Gait sequence id
        id: usize,
        /// Onset in seconds
        onset: f64,
        /// Duration in seconds
        duration: f64,
        /// Length of the signal in seconds
        signal_duration: f64,
    },

    /// Activity monitoring requires a datetime index
    #[error("index must be a datetime index")]
    IndexNotDatetime,

    /// Timestamps are not strictly increasing
    #[error("index must be strictly increasing (violated at position {position})")]
    NonIncreasingIndex {
        /// Position of the first offending timestamp
        position: usize,
    },

    /// Acceleration unit not recognized
    #[error("Unrecognized acceleration unit: {0:?} (expected one of \"g\", \"mg\", \"m/s^2\")")]
    UnknownUnit(String),

    /// Threshold cut points are not strictly increasing
    #[error("Invalid thresholds: {0}")]
    InvalidThresholds(String),

    /// Configuration value out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// JSON export error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
