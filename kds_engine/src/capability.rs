//! Capability traits: the engine's boundaries to user code.
//!
//! This module defines:
//! - `Node` trait - per-point user state attached at creation
//! - `NodeInitializer` trait - one-shot node setup before the run
//! - `Mover` trait - writes new axis positions each instant
//! - `AlgorithmCode` trait - the repair algorithm in its three modalities
//! - `CertificateGenerator` trait - reissues certificates after repair
//! - `Audit` trait - consistency check that halts the run on error
//! - `HookStatus` enum - optional-hook support reporting
//!
//! Optional hooks have default implementations returning
//! [`HookStatus::NotImplemented`]; the driver memoises that answer and
//! never calls the hook again, so an implementation's support surface is
//! effectively declared by which methods it overrides.

use std::sync::{Arc, Weak};

use crate::certificate::Certificate;
use crate::error::EngineError;
use crate::point::Point;

/// Whether an optional capability hook did work or is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStatus {
    /// The hook ran.
    Handled,
    /// The hook is not implemented; the driver stops calling it.
    NotImplemented,
}

// ─── Node ───────────────────────────────────────────────────────────

/// Per-point user state, opaque to the engine.
///
/// # Lifecycle
///
/// 1. `attach_point()` - called once when the owning point is created
/// 2. `number_of_changes()` - read once per instant during event
///    classification; counts externally-visible structural changes since
///    the previous read (resetting is the implementation's concern)
pub trait Node: Send {
    /// Externally-visible structural changes since the last instant.
    fn number_of_changes(&self) -> u64;

    /// Back-reference to the owning point, handed over once at creation.
    /// Never an ownership edge.
    ///
    /// Default implementation discards the reference (for nodes that do
    /// not need to navigate back).
    fn attach_point(&mut self, _point: Weak<Point>) {
        // Default: no-op
    }
}

/// A node with no structure: always reports zero changes.
#[derive(Debug, Default)]
pub struct NullNode;

impl Node for NullNode {
    fn number_of_changes(&self) -> u64 {
        0
    }
}

// ─── NodeInitializer ────────────────────────────────────────────────

/// One-shot node setup, run once over the full point set before the
/// first instant.
pub trait NodeInitializer: Send + Sync {
    /// Compute initial node values across all points.
    fn compute_initial_values(&self, points: &[Arc<Point>]) -> Result<(), EngineError>;
}

// ─── Mover ──────────────────────────────────────────────────────────

/// Writes new axis positions each instant.
///
/// Called only while at least one axis anywhere is statically defined;
/// fully polynomial-defined runs never need it. The mover must write
/// positions through [`Point::add_last_position`] so history buffers and
/// prediction refits stay consistent.
///
/// # Errors
/// A mover error terminates the run; the engine does not retry.
pub trait Mover: Send + Sync {
    /// Move every point to its position at `now`. `previous_now` is the
    /// time of the previous movement, absent on the first.
    fn move_points(
        &self,
        points: &[Arc<Point>],
        now: f64,
        previous_now: Option<f64>,
    ) -> Result<(), EngineError>;
}

// ─── AlgorithmCode ──────────────────────────────────────────────────

/// The user repair algorithm in its three modalities. All hooks are
/// optional; `max_iteration_count` bounds the per-point message-passing
/// rounds of an instant.
///
/// Hooks must not re-enter the driver. They mutate point state only:
/// certificates, messages, and the node.
pub trait AlgorithmCode: Send + Sync {
    /// Number of per-point rounds per instant.
    fn max_iteration_count(&self) -> usize;

    /// Decentralized modality: one call per point per round, fanned out
    /// across the worker pool. `failed` is the point's failed-certificate
    /// snapshot for this instant.
    fn per_point(
        &self,
        _round: usize,
        _failed: &[Arc<Certificate>],
        _point: &Arc<Point>,
        _points: &[Arc<Point>],
        _now: f64,
    ) -> Result<HookStatus, EngineError> {
        Ok(HookStatus::NotImplemented)
    }

    /// Centralized modality: once per instant after all points moved,
    /// with the failed certificates gathered across every point.
    fn run_after_all_points_moved(
        &self,
        _failed: &[Arc<Certificate>],
        _points: &[Arc<Point>],
        _now: f64,
    ) -> Result<HookStatus, EngineError> {
        Ok(HookStatus::NotImplemented)
    }

    /// Localized modality: once per moved point, at the end of the
    /// movement phase. `failed` is the moved point's failed-certificate
    /// snapshot.
    fn run_after_single_point_moved(
        &self,
        _failed: &[Arc<Certificate>],
        _points: &[Arc<Point>],
        _now: f64,
    ) -> Result<HookStatus, EngineError> {
        Ok(HookStatus::NotImplemented)
    }
}

// ─── CertificateGenerator ───────────────────────────────────────────

/// Reissues certificates after each instant's repairs. Either hook may be
/// absent; both present means `rebuild_all` runs first, then
/// `rebuild_for_point` per point across the worker pool.
pub trait CertificateGenerator: Send + Sync {
    /// Rebuild certificates with a global view.
    fn rebuild_all(
        &self,
        _points: &[Arc<Point>],
        _now: f64,
    ) -> Result<HookStatus, EngineError> {
        Ok(HookStatus::NotImplemented)
    }

    /// Rebuild certificates for a single point (its node is reachable
    /// through the point).
    fn rebuild_for_point(&self, _point: &Arc<Point>, _now: f64) -> Result<HookStatus, EngineError> {
        Ok(HookStatus::NotImplemented)
    }
}

// ─── Audit ──────────────────────────────────────────────────────────

/// End-of-instant consistency check.
///
/// # Errors
/// An error halts the simulation; all engine state stays observable for
/// debugging.
pub trait Audit: Send + Sync {
    /// Check the full point set for consistency.
    fn audit(&self, points: &[Arc<Point>]) -> Result<(), EngineError>;
}

// ─── Tests ──────────────────────────────────────────────────────────
