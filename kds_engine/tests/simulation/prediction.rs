//! Prediction divergence: a history of [0, 1, 4] fits t²; a divergent
//! sample at t = 3 (20 instead of the extrapolated 9) forces a refit,
//! bumps the refit counter, fires `PredictionChanged`, and refreshes the
//! failure-time cache of every registered certificate.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use kds_common::config::SimulatorConfig;
use kds_engine::certificate::{Certificate, CertificatePredicate};
use kds_engine::{Point, PointId};

use super::support::static_point;

/// Failure always 100 ahead of the evaluation time; counts evaluations
/// so cache refreshes are observable.
struct RecordingPredicate {
    calls: Arc<AtomicU64>,
}

impl CertificatePredicate for RecordingPredicate {
    fn failure_time(&self, _u: &Point, _v: &Point, now: f64) -> Option<f64> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Some(now + 100.0)
    }

    fn evaluate_validity(&self, _u: &Point, _v: &Point, _now: f64) -> bool {
        true
    }
}

#[test]
fn divergence_triggers_refit_and_cache_refresh() {
    let config = SimulatorConfig {
        enable_predictions: true,
        trajectory_epsilon: 1.0,
        ..SimulatorConfig::default()
    };
    let a = Point::create(PointId(0), static_point(0.0, 0.0), &config);
    let b = Point::create(PointId(1), static_point(10.0, 0.0), &config);

    let calls = Arc::new(AtomicU64::new(0));
    let cert = Certificate::register(
        &a,
        &b,
        Box::new(RecordingPredicate { calls: calls.clone() }),
        0.0,
    );
    a.add_certificate(cert.clone());
    assert_eq!(cert.failure_at_creation(), Some(100.0));
    assert_eq!(calls.load(Ordering::Relaxed), 1);

    let fired = Arc::new(AtomicU64::new(0));
    let f = fired.clone();
    a.prediction_changed().subscribe(Box::new(move |_| {
        f.fetch_add(1, Ordering::Relaxed);
    }));

    // History [0, 1, 4] at t = [0, 1, 2]: the buffer fills at t = 2 and
    // the first fit (t²) lands.
    a.add_last_position(&[1.0, 0.0], 1.0);
    assert_eq!(a.recomputed_polynomials(), 0);
    a.add_last_position(&[4.0, 0.0], 2.0);
    assert_eq!(a.recomputed_polynomials(), 1);
    assert_eq!(fired.load(Ordering::Relaxed), 1);
    assert_eq!(cert.failure_at_creation(), Some(102.0));

    // The fit extrapolates 9 at t = 3; the mover writes 20 instead.
    // |20 − 9| > ε = 1 → every axis refits, the counter increments,
    // the event fires, and the certificate cache is refreshed.
    a.add_last_position(&[20.0, 0.0], 3.0);
    assert_eq!(a.recomputed_polynomials(), 2);
    assert_eq!(fired.load(Ordering::Relaxed), 2);
    assert_eq!(cert.failure_at_creation(), Some(103.0));
    assert_eq!(calls.load(Ordering::Relaxed), 3);
}

#[test]
fn on_trajectory_samples_do_not_refit() {
    let config = SimulatorConfig {
        enable_predictions: true,
        trajectory_epsilon: 1.0,
        ..SimulatorConfig::default()
    };
    let a = Point::create(PointId(0), static_point(0.0, 0.0), &config);

    a.add_last_position(&[1.0, 0.0], 1.0);
    a.add_last_position(&[4.0, 0.0], 2.0);
    assert_eq!(a.recomputed_polynomials(), 1);

    // 9 is exactly the extrapolated value: within tolerance, no refit.
    a.add_last_position(&[9.0, 0.0], 3.0);
    assert_eq!(a.recomputed_polynomials(), 1);
    // 16.5 vs extrapolated 16: still within ε.
    a.add_last_position(&[16.5, 0.0], 4.0);
    assert_eq!(a.recomputed_polynomials(), 1);
}
