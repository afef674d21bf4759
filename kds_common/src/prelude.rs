//! Prelude module for common re-exports.
//!
//! Consumers can do `use kds_common::prelude::*;` and get the most
//! important types without listing individual paths.

// ─── Polynomial Math ────────────────────────────────────────────────
pub use crate::poly::{PolyError, Polynomial};

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ClassificationPolicy, ConfigError, SimulatorConfig};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{MAX_AXES_LIMIT, MAX_HISTORY_LIMIT};
