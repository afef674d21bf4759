//! Per-axis trajectory state.
//!
//! Each axis carries the ground-truth static polynomial, an optional
//! least-squares predicted polynomial, and a ring buffer of recent
//! position samples. The buffer is a fixed-size array with a runtime
//! depth and head counter; reads always return samples in chronological
//! order regardless of head position.

use kds_common::consts::MAX_HISTORY_LIMIT;
use kds_common::poly::Polynomial;

/// One observed `(time, position)` pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Observation time.
    pub time: f64,
    /// Observed position.
    pub position: f64,
}

/// How an axis trajectory is initially defined.
#[derive(Debug, Clone)]
pub enum AxisDefinition {
    /// A scalar position: the axis is statically defined and the mover
    /// supplies new positions each instant.
    Static(f64),
    /// A full trajectory polynomial: ground truth for all time.
    Trajectory(Polynomial),
}

// ─── Axis State ─────────────────────────────────────────────────────

/// Per-axis runtime state: static + predicted polynomials and the
/// position-history ring buffer.
#[derive(Debug, Clone)]
pub struct AxisState {
    /// Ground-truth trajectory polynomial.
    static_pol: Polynomial,
    /// True when the axis is defined by scalar positions (degree-0
    /// static polynomial rewritten on every sample).
    is_static: bool,
    /// Least-squares prediction over the buffered samples, when available.
    predicted: Option<Polynomial>,
    /// Sample ring buffer (fixed capacity, runtime depth).
    buf: [Option<Sample>; MAX_HISTORY_LIMIT],
    /// Next write slot.
    head: usize,
    /// Configured history depth (ring capacity in use).
    depth: usize,
}

impl AxisState {
    /// Create an axis from its definition. Statically defined axes are
    /// seeded with one sample at `t0` so the history starts at the
    /// initial position.
    pub fn new(definition: &AxisDefinition, depth: usize, t0: f64) -> Self {
        let mut axis = Self {
            static_pol: Polynomial::zero(),
            is_static: true,
            predicted: None,
            buf: [None; MAX_HISTORY_LIMIT],
            head: 0,
            depth,
        };
        match definition {
            AxisDefinition::Static(x) => axis.add_sample(*x, t0),
            AxisDefinition::Trajectory(p) => axis.set_trajectory(p.clone()),
        }
        axis
    }

    /// Record a scalar position: rewrites the static polynomial to the
    /// constant `[x]`, marks the axis statically defined, and appends
    /// `(t, x)` at the ring head.
    pub fn add_sample(&mut self, x: f64, t: f64) {
        self.static_pol = Polynomial::constant(x);
        self.is_static = true;
        self.buf[self.head] = Some(Sample { time: t, position: x });
        self.head = (self.head + 1) % self.depth;
    }

    /// Install a full trajectory polynomial; the axis is no longer
    /// statically defined.
    pub fn set_trajectory(&mut self, p: Polynomial) {
        self.static_pol = p;
        self.is_static = false;
    }

    /// Buffered samples in chronological order: `buf[head..] ++ buf[..head]`.
    pub fn ordered_samples(&self) -> Vec<Option<Sample>> {
        let mut out = Vec::with_capacity(self.depth);
        out.extend_from_slice(&self.buf[self.head..self.depth]);
        out.extend_from_slice(&self.buf[..self.head]);
        out
    }

    /// True once every ring slot holds a sample.
    pub fn buffer_full(&self) -> bool {
        self.buf[..self.depth].iter().all(Option::is_some)
    }

    /// Ground-truth position at `t`.
    #[inline]
    pub fn static_position(&self, t: f64) -> f64 {
        self.static_pol.evaluate(t)
    }

    /// Predicted position at `t`, when a prediction is available.
    #[inline]
    pub fn predicted_position(&self, t: f64) -> Option<f64> {
        self.predicted.as_ref().map(|p| p.evaluate(t))
    }

    /// The ground-truth polynomial.
    pub fn static_polynomial(&self) -> &Polynomial {
        &self.static_pol
    }

    /// The predicted polynomial, when available.
    pub fn predicted_polynomial(&self) -> Option<&Polynomial> {
        self.predicted.as_ref()
    }

    /// Predicted polynomial if present, else static.
    pub fn effective_polynomial(&self) -> &Polynomial {
        self.predicted.as_ref().unwrap_or(&self.static_pol)
    }

    /// True when the axis is defined by scalar positions.
    #[inline]
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// True when a predicted polynomial is available.
    #[inline]
    pub fn has_prediction(&self) -> bool {
        self.predicted.is_some()
    }

    /// Refit the prediction from the buffered samples: the interpolating
    /// polynomial of degree `depth - 1` when the buffer is full. A
    /// singular fit clears the prediction (numerical failure is
    /// "prediction unavailable", never an error); a part-filled buffer
    /// leaves the prediction untouched.
    pub fn refit(&mut self) {
        if !self.buffer_full() {
            return;
        }
        let mut times = Vec::with_capacity(self.depth);
        let mut values = Vec::with_capacity(self.depth);
        for sample in self.ordered_samples().into_iter().flatten() {
            times.push(sample.time);
            values.push(sample.position);
        }
        self.predicted = Polynomial::fit(&times, &values).ok();
    }

    /// Drop the prediction.
    pub fn clear_prediction(&mut self) {
        self.predicted = None;
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
