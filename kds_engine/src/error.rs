//! Engine error taxonomy.
//!
//! Every fallible engine surface funnels into [`EngineError`]. Capability
//! implementations report their own failures through the message-carrying
//! variants; a `NotImplemented` hook report is not an error (see
//! [`crate::capability::HookStatus`]).

use kds_common::config::ConfigError;
use thiserror::Error;

/// Error types for simulator construction and execution.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration rejected.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Point definition inconsistent with the configuration.
    #[error("point definition invalid: {0}")]
    Definition(String),

    /// Node initializer failed.
    #[error("node initializer failed: {0}")]
    Initializer(String),

    /// Mover failed; the instant is abandoned and the run terminates.
    #[error("mover failed: {0}")]
    Mover(String),

    /// An algorithm hook failed.
    #[error("algorithm hook failed: {0}")]
    Algorithm(String),

    /// Certificate generator failed.
    #[error("certificate generator failed: {0}")]
    Generator(String),

    /// Audit detected an inconsistency; the simulation halts with state
    /// left observable.
    #[error("audit failed: {0}")]
    Audit(String),
}
