//! Advance-time policy: event-driven jumps vs the discrete fallback.
//!
//! The scheduler jumps straight to the soonest cached certificate failure
//! when trajectories are fully known — every point fully predicted, or no
//! axis statically defined. Until then it falls back to fixed steps,
//! because statically defined positions only materialise when the mover
//! runs. An empty candidate set in event-driven mode is termination: the
//! clock jumps to the end time.

use std::sync::Arc;

use tracing::debug;

use kds_common::config::SimulatorConfig;

use crate::certificate::CertificateId;
use crate::point::Point;

/// Which branch [`Scheduler::advance`] took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceMode {
    /// Jumped to the soonest cached certificate failure.
    EventDriven,
    /// Advanced by one fixed time step.
    Stepped,
    /// No failure candidate remained; jumped to the end time.
    Exhausted,
}

/// Simulation clock and advance-time policy.
#[derive(Debug)]
pub struct Scheduler {
    end_time: f64,
    time_step: f64,
    current: f64,
}

impl Scheduler {
    /// Create a scheduler at the configured start time.
    pub fn new(config: &SimulatorConfig) -> Self {
        Self {
            end_time: config.end_time,
            time_step: config.time_step,
            current: config.start_time,
        }
    }

    /// Current simulation time.
    #[inline]
    pub fn current_time(&self) -> f64 {
        self.current
    }

    /// True once the clock has reached the end time.
    pub fn finished(&self) -> bool {
        self.current >= self.end_time
    }

    /// Pick the next instant. Candidates are cached failure times
    /// strictly greater than now; ties break on the certificate's stable
    /// id. Jumps never overshoot the end time.
    pub fn advance(&mut self, points: &[Arc<Point>]) -> (f64, AdvanceMode) {
        let now = self.current;
        let all_have_predictions = points.iter().all(|p| p.has_full_prediction());
        let no_statics = points.iter().all(|p| !p.any_static());

        let (next, mode) = if all_have_predictions || no_statics {
            match soonest_failure(points, now) {
                Some((t, _)) => (t.min(self.end_time), AdvanceMode::EventDriven),
                None => (self.end_time, AdvanceMode::Exhausted),
            }
        } else {
            ((now + self.time_step).min(self.end_time), AdvanceMode::Stepped)
        };

        debug!(from = now, to = next, ?mode, "advance");
        self.current = next;
        (next, mode)
    }
}

/// The minimum cached failure time strictly after `now` across all live
/// certificates, with the certificate id as tie-break.
fn soonest_failure(points: &[Arc<Point>], now: f64) -> Option<(f64, CertificateId)> {
    let mut best: Option<(f64, CertificateId)> = None;
    for point in points {
        for cert in point.live_certificates() {
            let Some(failure) = cert.failure_at_creation() else {
                continue;
            };
            if failure > now {
                let key = (failure, cert.id());
                if best.is_none_or(|b| key < b) {
                    best = Some(key);
                }
            }
        }
    }
    best
}

// ─── Tests ──────────────────────────────────────────────────────────
