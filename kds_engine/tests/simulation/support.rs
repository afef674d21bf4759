//! Shared scenario building blocks: predicates, movers, generators.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use kds_common::poly::Polynomial;
use kds_engine::axis::AxisDefinition;
use kds_engine::certificate::{Certificate, CertificatePredicate};
use kds_engine::{
    AlgorithmCode, CertificateGenerator, EngineError, HookStatus, Mover, Point, PointDefinition,
};

/// Route engine tracing to the test writer when `RUST_LOG` asks for it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ── Predicates ──────────────────────────────────────────────────────

/// Holds while the endpoints stay further apart than `threshold`.
pub struct SeparationAbove {
    pub threshold: f64,
}

impl CertificatePredicate for SeparationAbove {
    fn failure_time(&self, u: &Point, v: &Point, now: f64) -> Option<f64> {
        let gap =
            &u.square_distance(v) - &Polynomial::constant(self.threshold * self.threshold);
        gap.first_root_after(now)
    }

    fn evaluate_validity(&self, u: &Point, v: &Point, now: f64) -> bool {
        u.distance(v, now) > self.threshold
    }
}

/// Fails at every instant; keeps the algorithm rounds running.
pub struct AlwaysFails;

impl CertificatePredicate for AlwaysFails {
    fn failure_time(&self, _u: &Point, _v: &Point, now: f64) -> Option<f64> {
        Some(now + 1.0)
    }

    fn evaluate_validity(&self, _u: &Point, _v: &Point, _now: f64) -> bool {
        false
    }
}

// ── Movers ──────────────────────────────────────────────────────────

/// Rewrites every point's static axes with their current values: the
/// points stand still but histories keep filling.
pub struct HoldMover;

impl Mover for HoldMover {
    fn move_points(
        &self,
        points: &[Arc<Point>],
        now: f64,
        _previous_now: Option<f64>,
    ) -> Result<(), EngineError> {
        for point in points {
            let positions = point.static_positions(now);
            point.add_last_position(&positions, now);
        }
        Ok(())
    }
}

/// A mover that must never run (fully polynomial-defined scenarios).
pub struct UnreachableMover;

impl Mover for UnreachableMover {
    fn move_points(
        &self,
        _points: &[Arc<Point>],
        now: f64,
        _previous_now: Option<f64>,
    ) -> Result<(), EngineError> {
        Err(EngineError::Mover(format!(
            "mover invoked at t = {now} in a fully dynamic scenario"
        )))
    }
}

// ── Algorithms ──────────────────────────────────────────────────────

/// Implements nothing beyond the round bound.
pub struct IdleAlgorithm {
    pub rounds: usize,
}

impl AlgorithmCode for IdleAlgorithm {
    fn max_iteration_count(&self) -> usize {
        self.rounds
    }
}

// ── Generators ──────────────────────────────────────────────────────

/// Registers one separation certificate between points 0 and 1 at the
/// initial build and never reissues it.
pub struct OnceSeparationGenerator {
    pub threshold: f64,
    done: AtomicBool,
}

impl OnceSeparationGenerator {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            done: AtomicBool::new(false),
        }
    }
}

impl CertificateGenerator for OnceSeparationGenerator {
    fn rebuild_all(&self, points: &[Arc<Point>], now: f64) -> Result<HookStatus, EngineError> {
        if !self.done.swap(true, Ordering::Relaxed) {
            let cert = Certificate::register(
                &points[0],
                &points[1],
                Box::new(SeparationAbove {
                    threshold: self.threshold,
                }),
                now,
            );
            points[0].add_certificate(cert);
        }
        Ok(HookStatus::Handled)
    }
}

// ── Definitions ─────────────────────────────────────────────────────

/// A two-axis point at a fixed scalar position.
pub fn static_point(x: f64, y: f64) -> PointDefinition {
    PointDefinition::new(vec![AxisDefinition::Static(x), AxisDefinition::Static(y)])
}

/// A two-axis point on fixed polynomial trajectories.
pub fn trajectory_point(x: Polynomial, y: Polynomial) -> PointDefinition {
    PointDefinition::new(vec![
        AxisDefinition::Trajectory(x),
        AxisDefinition::Trajectory(y),
    ])
}
