//! Point state: the per-point aggregate the whole engine revolves around.
//!
//! A point owns its axis states, its ordered live-certificate index plus
//! the per-instant graveyard, its inbound message queue, the event
//! counters, and the user node. Locking follows the engine's discipline:
//! the message queue has its own mutex (the only lock other points'
//! round tasks ever take), the certificate set has one mutex touched only
//! by the owning task during rounds, and the axes sit behind a read-write
//! lock written exclusively from the serial movement phase.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use heapless::Vec as BoundedVec;
use kds_common::config::{ClassificationPolicy, SimulatorConfig};
use kds_common::consts::MAX_AXES_LIMIT;
use kds_common::poly::Polynomial;
use parking_lot::{Mutex, RwLock};

use crate::axis::{AxisDefinition, AxisState};
use crate::capability::{AlgorithmCode, HookStatus, Node, NullNode};
use crate::certificate::{Certificate, CertificateIndex};
use crate::error::EngineError;
use crate::observer::{Channel, PositionChange, PredictionChange};

/// Arena index of a point; stable for the simulator's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PointId(pub usize);

/// One inbound message record.
#[derive(Debug)]
pub struct Message {
    /// User-defined message kind.
    pub kind: u32,
    /// The sending point.
    pub sender: PointId,
    payload: Weak<Point>,
}

/// Outcome of one per-point algorithm round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    /// No failed certificates; the hook was not invoked.
    NoFailures,
    /// The hook ran.
    Ran,
    /// The hook reported itself unimplemented.
    Unsupported,
}

// ─── Point Definition ───────────────────────────────────────────────

/// Construction-time description of one point: its axis trajectories and
/// its user node.
pub struct PointDefinition {
    /// Per-axis trajectory definition; length must equal the configured
    /// axis count.
    pub axes: Vec<AxisDefinition>,
    /// The user node attached to the point.
    pub node: Box<dyn Node>,
}

impl PointDefinition {
    /// A definition with the given axes and a [`NullNode`].
    pub fn new(axes: Vec<AxisDefinition>) -> Self {
        Self {
            axes,
            node: Box::new(NullNode),
        }
    }

    /// Replace the node.
    pub fn with_node(mut self, node: Box<dyn Node>) -> Self {
        self.node = node;
        self
    }
}

// ─── Point ──────────────────────────────────────────────────────────

struct CertificateSet {
    live: CertificateIndex,
    graveyard: Vec<Arc<Certificate>>,
}

/// A moving point: axes, certificates, messages, counters, node, events.
pub struct Point {
    id: PointId,
    enable_predictions: bool,
    trajectory_epsilon: f64,

    axes: RwLock<Vec<AxisState>>,
    certificates: Mutex<CertificateSet>,
    /// Inbound message queue; its mutex is the only lock other points'
    /// tasks take on this point.
    queue: Mutex<Vec<Message>>,
    node: Mutex<Box<dyn Node>>,

    position_changed: Channel<PositionChange>,
    prediction_changed: Channel<PredictionChange>,

    received_messages: AtomicU64,
    sent_messages: AtomicU64,
    internal_events: AtomicU64,
    external_events: AtomicU64,
    /// Per-instant scratch: retirements counted since the last
    /// classification pass.
    removed_certificates: AtomicU64,
    recomputed_polynomials: AtomicU64,
    changed: AtomicBool,
    moved: AtomicBool,
}

impl Point {
    /// Create a point from its definition and hand the node its
    /// back-reference.
    pub fn create(id: PointId, definition: PointDefinition, config: &SimulatorConfig) -> Arc<Self> {
        let axes = definition
            .axes
            .iter()
            .map(|d| AxisState::new(d, config.history_depth, config.start_time))
            .collect();
        let point = Arc::new(Self {
            id,
            enable_predictions: config.enable_predictions,
            trajectory_epsilon: config.trajectory_epsilon,
            axes: RwLock::new(axes),
            certificates: Mutex::new(CertificateSet {
                live: CertificateIndex::new(),
                graveyard: Vec::new(),
            }),
            queue: Mutex::new(Vec::new()),
            node: Mutex::new(definition.node),
            position_changed: Channel::new(),
            prediction_changed: Channel::new(),
            received_messages: AtomicU64::new(0),
            sent_messages: AtomicU64::new(0),
            internal_events: AtomicU64::new(0),
            external_events: AtomicU64::new(0),
            removed_certificates: AtomicU64::new(0),
            recomputed_polynomials: AtomicU64::new(0),
            changed: AtomicBool::new(false),
            moved: AtomicBool::new(false),
        });
        point.node.lock().attach_point(Arc::downgrade(&point));
        point
    }

    /// Arena id.
    #[inline]
    pub fn id(&self) -> PointId {
        self.id
    }

    /// Number of axes.
    pub fn axis_count(&self) -> usize {
        self.axes.read().len()
    }

    // ─── Positions & Trajectories ───────────────────────────────────

    /// Absorb one position sample per axis at time `t` and run the
    /// prediction refit policy. This is the mover's write entry point.
    ///
    /// Refit is all-or-nothing across the point's axes: when any axis
    /// lacks a prediction or any axis's prediction diverges from its
    /// static position by more than the trajectory tolerance, every axis
    /// refits, and `PredictionChanged` fires only once all axes carry a
    /// fresh fit.
    pub fn add_last_position(&self, positions: &[f64], t: f64) {
        let mut refit_payload: Option<BoundedVec<Polynomial, MAX_AXES_LIMIT>> = None;
        {
            let mut axes = self.axes.write();
            debug_assert_eq!(positions.len(), axes.len());
            for (axis, &x) in axes.iter_mut().zip(positions) {
                axis.add_sample(x, t);
            }
            if self.enable_predictions {
                let needs_refit = axes.iter().any(|a| !a.has_prediction())
                    || axes.iter().any(|a| {
                        a.predicted_position(t)
                            .is_some_and(|p| (p - a.static_position(t)).abs() > self.trajectory_epsilon)
                    });
                if needs_refit {
                    for axis in axes.iter_mut() {
                        axis.refit();
                    }
                    if axes.iter().all(|a| a.has_prediction()) {
                        let mut pols = BoundedVec::new();
                        for axis in axes.iter() {
                            if let Some(p) = axis.predicted_polynomial() {
                                let _ = pols.push(p.clone());
                            }
                        }
                        refit_payload = Some(pols);
                    }
                }
            }
        }
        self.moved.store(true, Ordering::Relaxed);

        let mut pos_payload = BoundedVec::new();
        for &x in positions {
            let _ = pos_payload.push(x);
        }
        self.position_changed.emit(&PositionChange {
            point: self.id,
            positions: pos_payload,
            time: t,
        });

        if let Some(predicted) = refit_payload {
            self.recomputed_polynomials.fetch_add(1, Ordering::Relaxed);
            self.prediction_changed.emit(&PredictionChange {
                point: self.id,
                predicted,
                time: t,
            });
        }
    }

    /// Ground-truth position per axis at `t`.
    pub fn static_positions(&self, t: f64) -> Vec<f64> {
        self.axes.read().iter().map(|a| a.static_position(t)).collect()
    }

    /// Predicted position per axis at `t`; absent unless every axis has
    /// a prediction.
    pub fn predicted_positions(&self, t: f64) -> Option<Vec<f64>> {
        let axes = self.axes.read();
        axes.iter().map(|a| a.predicted_position(t)).collect()
    }

    /// True when every axis carries a predicted polynomial.
    pub fn has_full_prediction(&self) -> bool {
        self.axes.read().iter().all(|a| a.has_prediction())
    }

    /// True when any axis is statically defined.
    pub fn any_static(&self) -> bool {
        self.axes.read().iter().any(|a| a.is_static())
    }

    /// Run `f` over the axis states (read access).
    pub fn with_axes<R>(&self, f: impl FnOnce(&[AxisState]) -> R) -> R {
        f(&self.axes.read())
    }

    /// L2 norm of effective-position differences at `t`: predicted
    /// positions when both points are fully predicted, static otherwise.
    pub fn distance(&self, other: &Point, t: f64) -> f64 {
        let a = self.axes.read();
        let b = other.axes.read();
        let use_predicted =
            a.iter().all(|x| x.has_prediction()) && b.iter().all(|x| x.has_prediction());
        let mut sum = 0.0;
        for (ax, bx) in a.iter().zip(b.iter()) {
            let (pa, pb) = if use_predicted {
                (
                    ax.predicted_position(t).unwrap_or_else(|| ax.static_position(t)),
                    bx.predicted_position(t).unwrap_or_else(|| bx.static_position(t)),
                )
            } else {
                (ax.static_position(t), bx.static_position(t))
            };
            let d = pa - pb;
            sum += d * d;
        }
        sum.sqrt()
    }

    /// Squared distance to `other` in polynomial form: Σ over axes of
    /// `(Aᵢ − Bᵢ)²` using each axis's effective polynomial. Certificates
    /// root-solve the result for failure times.
    pub fn square_distance(&self, other: &Point) -> Polynomial {
        let a = self.axes.read();
        let b = other.axes.read();
        let mut sum = Polynomial::zero();
        for (ax, bx) in a.iter().zip(b.iter()) {
            let diff = ax.effective_polynomial() - bx.effective_polynomial();
            sum = &sum + &(&diff * &diff);
        }
        sum
    }

    // ─── Certificates ───────────────────────────────────────────────

    /// Register a certificate in the live index. Returns false when it
    /// was already present.
    pub fn add_certificate(&self, cert: Arc<Certificate>) -> bool {
        self.certificates.lock().live.insert(cert)
    }

    /// Snapshot of the live certificates, in index order.
    pub fn live_certificates(&self) -> Vec<Arc<Certificate>> {
        self.certificates.lock().live.iter().cloned().collect()
    }

    /// Number of live certificates.
    pub fn certificate_count(&self) -> usize {
        self.certificates.lock().live.len()
    }

    /// Number of graveyard entries awaiting disposal.
    pub fn graveyard_count(&self) -> usize {
        self.certificates.lock().graveyard.len()
    }

    /// Retire a certificate: remove it from the live index, move it to
    /// the graveyard, and count the retirement. Returns false when the
    /// certificate is not live (already retired).
    pub fn remove_certificate(&self, cert: &Arc<Certificate>) -> bool {
        let mut set = self.certificates.lock();
        if set.live.remove(cert.id()).is_none() {
            return false;
        }
        if !set.graveyard.iter().any(|g| g.id() == cert.id()) {
            set.graveyard.push(cert.clone());
        }
        drop(set);
        self.removed_certificates.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Scan the live index for certificates whose predicate no longer
    /// holds, append each (once) to the graveyard without removing it
    /// from the live index, and return the failed snapshot.
    ///
    /// Idempotent within an instant: repeated calls return the same set
    /// and never duplicate graveyard entries.
    pub fn failed_certificates(&self, now: f64) -> Vec<Arc<Certificate>> {
        let mut set = self.certificates.lock();
        let mut failed = Vec::new();
        for cert in set.live.iter() {
            if !cert.evaluate_validity(now) {
                failed.push(cert.clone());
            }
        }
        for cert in &failed {
            if !set.graveyard.iter().any(|g| g.id() == cert.id()) {
                set.graveyard.push(cert.clone());
            }
        }
        failed
    }

    /// End-of-instant certificate GC: physically remove every graveyard
    /// entry from the live index (counting retirements the user did not
    /// already count), dispose each exactly once, and clear the
    /// graveyard. Returns the number of certificates disposed.
    pub(crate) fn collect_garbage(&self) -> u64 {
        let graveyard = std::mem::take(&mut self.certificates.lock().graveyard);
        let disposed = graveyard.len() as u64;
        for cert in &graveyard {
            self.remove_certificate(cert);
            cert.dispose();
        }
        // Retirements above re-enter the graveyard; they are the
        // just-disposed certificates, so the instant ends disjoint.
        self.certificates.lock().graveyard.clear();
        disposed
    }

    // ─── Messages ───────────────────────────────────────────────────

    /// Send a message to `to`: bumps the own sent counter, then inserts
    /// the record under the recipient's queue mutex.
    pub fn send_message(&self, to: &Point, kind: u32, payload: &Arc<Point>) {
        self.sent_messages.fetch_add(1, Ordering::Relaxed);
        to.queue.lock().push(Message {
            kind,
            sender: self.id,
            payload: Arc::downgrade(payload),
        });
    }

    /// Filter-drain the own queue by `kind`, count the receptions, and
    /// return the payload points. A second call in succession returns
    /// an empty vector.
    pub fn receive_messages(&self, kind: u32) -> Vec<Arc<Point>> {
        let mut queue = self.queue.lock();
        let mut received = Vec::new();
        let mut kept = Vec::with_capacity(queue.len());
        for msg in queue.drain(..) {
            if msg.kind == kind {
                if let Some(payload) = msg.payload.upgrade() {
                    received.push(payload);
                }
            } else {
                kept.push(msg);
            }
        }
        *queue = kept;
        drop(queue);
        self.received_messages
            .fetch_add(received.len() as u64, Ordering::Relaxed);
        received
    }

    /// Drop every queued message.
    pub fn clear_messages(&self) {
        self.queue.lock().clear();
    }

    /// Number of queued messages.
    pub fn queued_messages(&self) -> usize {
        self.queue.lock().len()
    }

    // ─── Algorithm Round ────────────────────────────────────────────

    /// One per-point algorithm round: compute the failed-certificate
    /// snapshot, skip the hook when nothing failed, otherwise invoke it.
    /// The round-0 queue wipe happens in the driver's barrier step before
    /// the first round, so parallel round-0 sends can never race a clear.
    pub fn run_algorithm(
        self: &Arc<Self>,
        round: usize,
        code: &dyn AlgorithmCode,
        points: &[Arc<Point>],
        now: f64,
    ) -> Result<RoundOutcome, EngineError> {
        let failed = self.failed_certificates(now);
        if failed.is_empty() {
            return Ok(RoundOutcome::NoFailures);
        }
        match code.per_point(round, &failed, self, points, now)? {
            HookStatus::Handled => Ok(RoundOutcome::Ran),
            HookStatus::NotImplemented => Ok(RoundOutcome::Unsupported),
        }
    }

    // ─── Node & Event Classification ────────────────────────────────

    /// Run `f` with exclusive access to the user node.
    pub fn with_node<R>(&self, f: impl FnOnce(&mut dyn Node) -> R) -> R {
        let mut node = self.node.lock();
        f(&mut **node)
    }

    /// End-of-instant event classification: split the instant's
    /// retirements into internal/external events against the node's
    /// reported change count, reset the scratch counter, and latch
    /// `changed`. Returns the node's change count.
    pub(crate) fn classify_events(&self, policy: ClassificationPolicy) -> u64 {
        let removed = self.removed_certificates.swap(0, Ordering::Relaxed);
        let ext = self.node.lock().number_of_changes();
        if removed > ext {
            self.external_events.fetch_add(ext, Ordering::Relaxed);
            self.internal_events
                .fetch_add(removed - ext, Ordering::Relaxed);
        } else if policy == ClassificationPolicy::AttributeExternal {
            self.external_events.fetch_add(removed, Ordering::Relaxed);
        }
        self.changed.store(ext != 0, Ordering::Relaxed);
        ext
    }

    // ─── Channels & Counters ────────────────────────────────────────

    /// The `PositionChanged` channel: fires on every movement.
    pub fn position_changed(&self) -> &Channel<PositionChange> {
        &self.position_changed
    }

    /// The `PredictionChanged` channel: fires on every all-axes refit.
    pub fn prediction_changed(&self) -> &Channel<PredictionChange> {
        &self.prediction_changed
    }

    /// Live `PredictionChanged` subscriptions (listener-balance checks).
    pub fn prediction_listener_count(&self) -> usize {
        self.prediction_changed.len()
    }

    /// Messages received over the run.
    pub fn received_messages(&self) -> u64 {
        self.received_messages.load(Ordering::Relaxed)
    }

    /// Messages sent over the run.
    pub fn sent_messages(&self) -> u64 {
        self.sent_messages.load(Ordering::Relaxed)
    }

    /// Certificate failures classified as internal events.
    pub fn internal_events(&self) -> u64 {
        self.internal_events.load(Ordering::Relaxed)
    }

    /// Certificate failures classified as external events.
    pub fn external_events(&self) -> u64 {
        self.external_events.load(Ordering::Relaxed)
    }

    /// Retirements counted in the current instant (scratch).
    pub fn removed_certificates(&self) -> u64 {
        self.removed_certificates.load(Ordering::Relaxed)
    }

    /// Prediction refits over the run.
    pub fn recomputed_polynomials(&self) -> u64 {
        self.recomputed_polynomials.load(Ordering::Relaxed)
    }

    /// Whether the node reported changes in the last classified instant.
    pub fn changed(&self) -> bool {
        self.changed.load(Ordering::Relaxed)
    }

    /// Consume the moved-this-instant latch.
    pub(crate) fn take_moved(&self) -> bool {
        self.moved.swap(false, Ordering::Relaxed)
    }
}

impl std::fmt::Debug for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Point")
            .field("id", &self.id)
            .field("axes", &self.axis_count())
            .field("certificates", &self.certificate_count())
            .field("queued_messages", &self.queued_messages())
            .finish()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
