//! Error types for the pair-trading engine.

use thiserror::Error;

/// Main error type for pair analytics and backtesting.
///
/// All variants are deterministic functions of the input data; the engine
/// performs no I/O during estimation or simulation, so there are no
/// transient/retryable failures.
#[derive(Error, Debug)]
pub enum PairError {
    /// Too few aligned points for the requested method or window. Never
    /// silently degraded to a different method.
    #[error("insufficient data: {required} points required, {actual} available")]
    InsufficientData { required: usize, actual: usize },

    /// Mismatched or non-overlapping time indices between two series, or
    /// between a time-varying estimate and a spread request.
    #[error("alignment error: {0}")]
    Alignment(String),

    /// Whole-input degeneracy (e.g. zero-variance regressor). Per-point
    /// degeneracy is marked as an undefined value instead, and processing
    /// continues.
    #[error("degenerate input: {0}")]
    DegenerateInput(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for pair operations.
pub type Result<T> = std::result::Result<T, PairError>;
