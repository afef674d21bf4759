//! System-wide constants for the KDS workspace.
//!
//! Single source of truth for capacity ceilings and simulator defaults.
//! Imported by all crates — no duplication permitted.

use static_assertions::const_assert;

/// Maximum number of axes per point.
pub const MAX_AXES_LIMIT: usize = 8;

/// Maximum position-history depth per axis (ring buffer capacity ceiling).
pub const MAX_HISTORY_LIMIT: usize = 8;

/// Minimum history depth for which a polynomial fit is meaningful.
pub const MIN_HISTORY_DEPTH: usize = 2;

/// Default simulation start time.
pub const START_TIME_DEFAULT: f64 = 0.0;

/// Default simulation end time.
pub const END_TIME_DEFAULT: f64 = 1800.0;

/// Default discrete time step.
pub const TIME_STEP_DEFAULT: f64 = 1.0;

/// Default trajectory divergence tolerance before a prediction refit.
pub const TRAJECTORY_EPSILON_DEFAULT: f64 = 20.0;

/// Default position-history depth (samples per axis).
pub const HISTORY_DEPTH_DEFAULT: usize = 3;

/// Default number of axes per point.
pub const AXIS_COUNT_DEFAULT: usize = 2;

// A degree-(H-1) fit needs at least two samples, and the default depth
// must fit inside the ring buffer ceiling.
const_assert!(MIN_HISTORY_DEPTH >= 2);
const_assert!(HISTORY_DEPTH_DEFAULT <= MAX_HISTORY_LIMIT);
const_assert!(AXIS_COUNT_DEFAULT <= MAX_AXES_LIMIT);
