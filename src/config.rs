//! Configuration for estimation and backtesting.
//!
//! Every entry point receives an explicit [`EngineConfig`]; there are no
//! ambient or static defaults. Configurations can be loaded from TOML files
//! for reproducible runs.

use crate::error::{PairError, Result};
use crate::hedge::EstimatorMethod;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// Engine configuration value object.
///
/// Documented defaults: window 20, entry threshold 2.0, exit threshold 0.0,
/// position size 1.0, ADF alpha 0.05.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Hedge ratio estimation method.
    #[serde(default)]
    pub method: EstimatorMethod,
    /// Trailing window for rolling OLS, z-score and rolling correlation.
    #[serde(default = "default_window")]
    pub window: usize,
    /// Absolute z-score at which a position is opened.
    #[serde(default = "default_entry_threshold")]
    pub entry_threshold: f64,
    /// Z-score at which an open position is closed (0 = reversion to mean).
    #[serde(default = "default_exit_threshold")]
    pub exit_threshold: f64,
    /// Spread units traded per signal.
    #[serde(default = "default_position_size")]
    pub position_size: f64,
    /// Kalman filter noise parameters and priors.
    #[serde(default)]
    pub kalman: KalmanSettings,
    /// Significance level for the ADF stationarity test.
    #[serde(default = "default_adf_alpha")]
    pub adf_alpha: f64,
}

fn default_window() -> usize {
    20
}
fn default_entry_threshold() -> f64 {
    2.0
}
fn default_exit_threshold() -> f64 {
    0.0
}
fn default_position_size() -> f64 {
    1.0
}
fn default_adf_alpha() -> f64 {
    0.05
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            method: EstimatorMethod::default(),
            window: default_window(),
            entry_threshold: default_entry_threshold(),
            exit_threshold: default_exit_threshold(),
            position_size: default_position_size(),
            kalman: KalmanSettings::default(),
            adf_alpha: default_adf_alpha(),
        }
    }
}

impl EngineConfig {
    /// Load a configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        info!("Loaded engine configuration from {}", path.display());
        Ok(config)
    }

    /// Check parameter sanity.
    pub fn validate(&self) -> Result<()> {
        if self.window < 2 {
            return Err(PairError::Config(format!(
                "window must be at least 2, got {}",
                self.window
            )));
        }
        if self.entry_threshold <= 0.0 {
            return Err(PairError::Config(format!(
                "entry threshold must be positive, got {}",
                self.entry_threshold
            )));
        }
        if self.entry_threshold <= self.exit_threshold.abs() {
            return Err(PairError::Config(format!(
                "entry threshold ({}) must exceed |exit threshold| ({})",
                self.entry_threshold, self.exit_threshold
            )));
        }
        if self.position_size <= 0.0 {
            return Err(PairError::Config(format!(
                "position size must be positive, got {}",
                self.position_size
            )));
        }
        if !(0.0 < self.adf_alpha && self.adf_alpha < 1.0) {
            return Err(PairError::Config(format!(
                "ADF alpha must lie in (0, 1), got {}",
                self.adf_alpha
            )));
        }
        self.kalman.validate()
    }
}

/// Kalman filter settings.
///
/// Process noise controls adaptability versus smoothness: higher values let
/// the hedge ratio drift faster but track noise. Observation noise is the
/// variance of the measurement error in the pricing relation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KalmanSettings {
    #[serde(default = "default_process_noise")]
    pub process_noise: f64,
    #[serde(default = "default_observation_noise")]
    pub observation_noise: f64,
    /// Prior mean for the hedge ratio.
    #[serde(default = "default_initial_ratio")]
    pub initial_ratio: f64,
    /// Prior mean for the intercept.
    #[serde(default)]
    pub initial_intercept: f64,
    /// Prior variance on both state components. Large values give an
    /// uninformative prior.
    #[serde(default = "default_initial_variance")]
    pub initial_variance: f64,
}

fn default_process_noise() -> f64 {
    1e-5
}
fn default_observation_noise() -> f64 {
    1e-3
}
fn default_initial_ratio() -> f64 {
    1.0
}
fn default_initial_variance() -> f64 {
    1e5
}

impl Default for KalmanSettings {
    fn default() -> Self {
        Self {
            process_noise: default_process_noise(),
            observation_noise: default_observation_noise(),
            initial_ratio: default_initial_ratio(),
            initial_intercept: 0.0,
            initial_variance: default_initial_variance(),
        }
    }
}

impl KalmanSettings {
    fn validate(&self) -> Result<()> {
        if self.process_noise <= 0.0 || self.observation_noise <= 0.0 {
            return Err(PairError::Config(
                "Kalman noise parameters must be positive".to_string(),
            ));
        }
        if self.initial_variance <= 0.0 {
            return Err(PairError::Config(
                "Kalman initial variance must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
