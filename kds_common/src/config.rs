//! TOML configuration loader with validation for the simulator.
//!
//! Loads [`SimulatorConfig`] from a TOML file or string. Every field has a
//! default, so an empty document is a valid configuration. Validation
//! enforces parameter bounds before the engine ever sees the values —
//! invalid configs are rejected at construction, never mid-run.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::consts::{
    AXIS_COUNT_DEFAULT, END_TIME_DEFAULT, HISTORY_DEPTH_DEFAULT, MAX_AXES_LIMIT,
    MAX_HISTORY_LIMIT, MIN_HISTORY_DEPTH, START_TIME_DEFAULT, TIME_STEP_DEFAULT,
    TRAJECTORY_EPSILON_DEFAULT,
};

// ─── Error Type ─────────────────────────────────────────────────────

/// Configuration loading/validation error.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("config I/O error: {0}")]
    Io(String),

    /// TOML parse error.
    #[error("config parse error: {0}")]
    Parse(String),

    /// Parameter validation error.
    #[error("config validation: {0}")]
    Validation(String),
}

// ─── Event Classification Policy ────────────────────────────────────

/// How certificate retirements split into internal/external events when a
/// point's node reports at least as many structural changes as retirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationPolicy {
    /// Attribute every retirement as an external event; conservation
    /// (Δinternal + Δexternal = retirements) always holds.
    #[default]
    AttributeExternal,
    /// Neither counter grows when retirements ≤ reported changes.
    SkipWhenFewer,
}

// ─── Simulator Configuration ────────────────────────────────────────

/// Complete validated simulator configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimulatorConfig {
    /// Simulation start time.
    #[serde(default = "default_start_time")]
    pub start_time: f64,

    /// Simulation end time. The run terminates once the current time
    /// reaches this value.
    #[serde(default = "default_end_time")]
    pub end_time: f64,

    /// Discrete fallback time step, used while any axis is static and
    /// predictions are not yet available on every point.
    #[serde(default = "default_time_step")]
    pub time_step: f64,

    /// Divergence tolerance between a predicted and static position before
    /// the point's predictions are refit.
    #[serde(default = "default_trajectory_epsilon")]
    pub trajectory_epsilon: f64,

    /// Position-history depth per axis (ring buffer capacity, fit degree
    /// is `history_depth - 1`).
    #[serde(default = "default_history_depth")]
    pub history_depth: usize,

    /// Number of axes per point.
    #[serde(default = "default_axis_count")]
    pub axis_count: usize,

    /// Whether predicted polynomials are fit at all.
    #[serde(default)]
    pub enable_predictions: bool,

    /// Internal/external event split policy.
    #[serde(default)]
    pub classification: ClassificationPolicy,
}

fn default_start_time() -> f64 {
    START_TIME_DEFAULT
}
fn default_end_time() -> f64 {
    END_TIME_DEFAULT
}
fn default_time_step() -> f64 {
    TIME_STEP_DEFAULT
}
fn default_trajectory_epsilon() -> f64 {
    TRAJECTORY_EPSILON_DEFAULT
}
fn default_history_depth() -> usize {
    HISTORY_DEPTH_DEFAULT
}
fn default_axis_count() -> usize {
    AXIS_COUNT_DEFAULT
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            start_time: START_TIME_DEFAULT,
            end_time: END_TIME_DEFAULT,
            time_step: TIME_STEP_DEFAULT,
            trajectory_epsilon: TRAJECTORY_EPSILON_DEFAULT,
            history_depth: HISTORY_DEPTH_DEFAULT,
            axis_count: AXIS_COUNT_DEFAULT,
            enable_predictions: false,
            classification: ClassificationPolicy::default(),
        }
    }
}

impl SimulatorConfig {
    /// Parse a configuration from a TOML string and validate it.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("failed to read {}: {e}", path.display())))?;
        let config = Self::from_toml_str(&text)?;
        debug!(path = %path.display(), "simulator configuration loaded");
        Ok(config)
    }

    /// Validate all parameter bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.start_time.is_finite() || !self.end_time.is_finite() {
            return Err(ConfigError::Validation(
                "start_time and end_time must be finite".to_string(),
            ));
        }
        if self.end_time <= self.start_time {
            return Err(ConfigError::Validation(format!(
                "end_time {} must exceed start_time {}",
                self.end_time, self.start_time
            )));
        }
        if !(self.time_step > 0.0) || !self.time_step.is_finite() {
            return Err(ConfigError::Validation(format!(
                "time_step {} must be positive and finite",
                self.time_step
            )));
        }
        if !(self.trajectory_epsilon > 0.0) || !self.trajectory_epsilon.is_finite() {
            return Err(ConfigError::Validation(format!(
                "trajectory_epsilon {} must be positive and finite",
                self.trajectory_epsilon
            )));
        }
        if self.history_depth < MIN_HISTORY_DEPTH || self.history_depth > MAX_HISTORY_LIMIT {
            return Err(ConfigError::Validation(format!(
                "history_depth {} out of range [{MIN_HISTORY_DEPTH}, {MAX_HISTORY_LIMIT}]",
                self.history_depth
            )));
        }
        if self.axis_count == 0 || self.axis_count > MAX_AXES_LIMIT {
            return Err(ConfigError::Validation(format!(
                "axis_count {} out of range [1, {MAX_AXES_LIMIT}]",
                self.axis_count
            )));
        }
        Ok(())
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
