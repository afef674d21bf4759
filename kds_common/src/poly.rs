//! Dense univariate polynomial arithmetic over `f64`.
//!
//! Coefficients are stored lowest-degree first: `coeffs[i]` multiplies `tⁱ`.
//! Provides the arithmetic, interpolating fit, and real-root search the
//! trajectory and certificate machinery is built on. Degrees stay small
//! (history depth ≤ 8, squared-distance polynomials ≤ degree 14), so the
//! fit uses the Lagrange basis and the root search uses derivative-based
//! isolation — no companion matrices.

use std::ops::{Add, Mul, Sub};

use thiserror::Error;

/// Absolute tolerance below which a coefficient or residual counts as zero.
const ZERO_TOL: f64 = 1e-12;

/// Bisection refinement iterations for isolated roots.
const BISECT_STEPS: usize = 128;

// ─── Errors ─────────────────────────────────────────────────────────

/// Error types for polynomial fitting.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PolyError {
    /// Fit called with no samples.
    #[error("fit requires at least one sample")]
    EmptySamples,

    /// Times and positions arrays differ in length.
    #[error("sample count mismatch: {times} times vs {values} values")]
    SampleCountMismatch {
        /// Number of sample times supplied.
        times: usize,
        /// Number of sample values supplied.
        values: usize,
    },

    /// Two samples share (numerically) the same time — the fit is singular.
    #[error("singular fit: duplicate sample time {0}")]
    DuplicateSampleTime(f64),
}

// ─── Polynomial ─────────────────────────────────────────────────────

/// A dense univariate polynomial over `f64`, lowest-degree first.
#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial {
    coeffs: Vec<f64>,
}

impl Polynomial {
    /// Build a polynomial from coefficients, lowest-degree first.
    ///
    /// Trailing near-zero coefficients are trimmed; the zero polynomial
    /// is represented as a single zero coefficient.
    pub fn new(mut coeffs: Vec<f64>) -> Self {
        while coeffs.len() > 1 && coeffs.last().is_some_and(|c| c.abs() <= ZERO_TOL) {
            coeffs.pop();
        }
        if coeffs.is_empty() {
            coeffs.push(0.0);
        }
        Self { coeffs }
    }

    /// The constant polynomial `p(t) = x`.
    pub fn constant(x: f64) -> Self {
        Self { coeffs: vec![x] }
    }

    /// The zero polynomial.
    pub fn zero() -> Self {
        Self::constant(0.0)
    }

    /// Degree of the polynomial (0 for constants, including zero).
    #[inline]
    pub fn degree(&self) -> usize {
        self.coeffs.len() - 1
    }

    /// Coefficients, lowest-degree first.
    #[inline]
    pub fn coeffs(&self) -> &[f64] {
        &self.coeffs
    }

    /// True when the polynomial is (numerically) identically zero.
    pub fn is_zero(&self) -> bool {
        self.coeffs.iter().all(|c| c.abs() <= ZERO_TOL)
    }

    /// Evaluate at `t` via Horner's rule.
    #[inline]
    pub fn evaluate(&self, t: f64) -> f64 {
        self.coeffs.iter().rev().fold(0.0, |acc, &c| acc * t + c)
    }

    /// Multiply by a scalar.
    pub fn scale(&self, k: f64) -> Self {
        Self::new(self.coeffs.iter().map(|c| c * k).collect())
    }

    /// First derivative.
    pub fn derivative(&self) -> Self {
        if self.coeffs.len() <= 1 {
            return Self::zero();
        }
        Self::new(
            self.coeffs[1..]
                .iter()
                .enumerate()
                .map(|(i, c)| c * (i + 1) as f64)
                .collect(),
        )
    }

    // ─── Interpolating Fit ──────────────────────────────────────────

    /// Interpolating least-squares fit: the unique degree-`n-1` polynomial
    /// through `n` samples, built in the Lagrange basis.
    ///
    /// # Errors
    /// - [`PolyError::EmptySamples`] when no samples are given.
    /// - [`PolyError::SampleCountMismatch`] when the slices differ in length.
    /// - [`PolyError::DuplicateSampleTime`] when two sample times coincide
    ///   (a singular system — callers treat this as "no prediction").
    pub fn fit(times: &[f64], values: &[f64]) -> Result<Self, PolyError> {
        if times.len() != values.len() {
            return Err(PolyError::SampleCountMismatch {
                times: times.len(),
                values: values.len(),
            });
        }
        if times.is_empty() {
            return Err(PolyError::EmptySamples);
        }

        let mut result = Self::zero();
        for (i, (&ti, &yi)) in times.iter().zip(values.iter()).enumerate() {
            // ℓᵢ(t) = Π_{j≠i} (t − tⱼ) / (tᵢ − tⱼ)
            let mut basis = Self::constant(yi);
            for (j, &tj) in times.iter().enumerate() {
                if j == i {
                    continue;
                }
                let denom = ti - tj;
                if denom.abs() <= ZERO_TOL {
                    return Err(PolyError::DuplicateSampleTime(ti));
                }
                basis = &basis * &Self::new(vec![-tj / denom, 1.0 / denom]);
            }
            result = &result + &basis;
        }
        Ok(result)
    }

    // ─── Real Roots ─────────────────────────────────────────────────

    /// The smallest real root strictly greater than `t0`, or `None`.
    ///
    /// This is the failure-time primitive: for a certificate predicate
    /// expressed as `p(t) ≥ 0`, the first root after `t0` is the first
    /// instant the predicate can flip.
    pub fn first_root_after(&self, t0: f64) -> Option<f64> {
        self.real_roots().into_iter().find(|&r| r > t0)
    }

    /// All real roots, ascending. The zero polynomial reports none
    /// (its "roots" carry no event information).
    pub fn real_roots(&self) -> Vec<f64> {
        if self.is_zero() {
            return Vec::new();
        }
        let mut roots = match self.degree() {
            0 => Vec::new(),
            1 => roots_linear(&self.coeffs),
            2 => roots_quadratic(&self.coeffs),
            _ => self.roots_by_isolation(),
        };
        // Roots are finite by construction (evaluations of finite
        // coefficients inside the Cauchy bound).
        roots.sort_by(f64::total_cmp);
        roots.dedup_by(|a, b| (*a - *b).abs() <= ZERO_TOL);
        roots
    }

    /// Root search for degree ≥ 3: the polynomial is strictly monotonic
    /// between consecutive critical points, so the derivative's roots
    /// (found recursively) split the line into brackets that each hold at
    /// most one root, refined by bisection. Tangent roots coincide with
    /// critical points and are caught by the residual check.
    fn roots_by_isolation(&self) -> Vec<f64> {
        let bound = self.root_bound();
        let mut brackets = vec![-bound];
        for c in self.derivative().real_roots() {
            if c > -bound && c < bound {
                brackets.push(c);
            }
        }
        brackets.push(bound);

        // Scale-aware residual tolerance for "this bracket point is a root".
        let scale = self.coeffs.iter().fold(0.0f64, |m, c| m.max(c.abs()));
        let f_tol = scale * 1e-9;

        let mut roots = Vec::new();
        for pair in brackets.windows(2) {
            let (lo, hi) = (pair[0], pair[1]);
            let (flo, fhi) = (self.evaluate(lo), self.evaluate(hi));
            if flo.abs() <= f_tol {
                roots.push(lo);
                continue;
            }
            if fhi.abs() <= f_tol {
                // Picked up as the `lo` of the next bracket, or below for
                // the last bracket.
                if hi == bound {
                    roots.push(hi);
                }
                continue;
            }
            if flo.signum() != fhi.signum() {
                roots.push(self.bisect(lo, hi, flo));
            }
        }
        roots
    }

    /// Bisection on a bracket with a known sign change.
    fn bisect(&self, mut lo: f64, mut hi: f64, flo: f64) -> f64 {
        let lo_sign = flo.signum();
        for _ in 0..BISECT_STEPS {
            let mid = 0.5 * (lo + hi);
            if mid <= lo || mid >= hi {
                break;
            }
            let fmid = self.evaluate(mid);
            if fmid == 0.0 {
                return mid;
            }
            if fmid.signum() == lo_sign {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        0.5 * (lo + hi)
    }

    /// Cauchy bound: all real roots lie in `[-B, B]`.
    fn root_bound(&self) -> f64 {
        let lead = self.coeffs[self.degree()].abs();
        let max_ratio = self.coeffs[..self.degree()]
            .iter()
            .fold(0.0f64, |m, c| m.max(c.abs() / lead));
        1.0 + max_ratio
    }
}

fn roots_linear(coeffs: &[f64]) -> Vec<f64> {
    vec![-coeffs[0] / coeffs[1]]
}

fn roots_quadratic(coeffs: &[f64]) -> Vec<f64> {
    let (c, b, a) = (coeffs[0], coeffs[1], coeffs[2]);
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return Vec::new();
    }
    if disc.abs() <= ZERO_TOL {
        return vec![-b / (2.0 * a)];
    }
    // Citardauq form on one branch avoids cancellation when b dominates.
    let sq = disc.sqrt();
    let q = -0.5 * (b + b.signum() * sq);
    let mut roots = vec![q / a];
    if q.abs() > ZERO_TOL {
        roots.push(c / q);
    } else {
        roots.push(-b / (2.0 * a) + sq / (2.0 * a));
    }
    roots
}

// ─── Operators ──────────────────────────────────────────────────────

impl Add for &Polynomial {
    type Output = Polynomial;

    fn add(self, rhs: &Polynomial) -> Polynomial {
        let n = self.coeffs.len().max(rhs.coeffs.len());
        let mut out = vec![0.0; n];
        for (i, c) in self.coeffs.iter().enumerate() {
            out[i] += c;
        }
        for (i, c) in rhs.coeffs.iter().enumerate() {
            out[i] += c;
        }
        Polynomial::new(out)
    }
}

impl Sub for &Polynomial {
    type Output = Polynomial;

    fn sub(self, rhs: &Polynomial) -> Polynomial {
        let n = self.coeffs.len().max(rhs.coeffs.len());
        let mut out = vec![0.0; n];
        for (i, c) in self.coeffs.iter().enumerate() {
            out[i] += c;
        }
        for (i, c) in rhs.coeffs.iter().enumerate() {
            out[i] -= c;
        }
        Polynomial::new(out)
    }
}

impl Mul for &Polynomial {
    type Output = Polynomial;

    fn mul(self, rhs: &Polynomial) -> Polynomial {
        let mut out = vec![0.0; self.coeffs.len() + rhs.coeffs.len() - 1];
        for (i, a) in self.coeffs.iter().enumerate() {
            for (j, b) in rhs.coeffs.iter().enumerate() {
                out[i + j] += a * b;
            }
        }
        Polynomial::new(out)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
