//! Certificate lifecycle: user predicate trait, the engine-side
//! certificate base, and the ordered live-certificate index.
//!
//! A certificate is a user predicate over two endpoint points. The engine
//! base caches the failure time computed at creation and re-caches it from
//! a listener on each endpoint's `PredictionChanged` channel, so the
//! scheduler always sees failure estimates consistent with the current
//! trajectory fit. Disposal unhooks both listeners exactly once.
//!
//! Endpoints are non-owning `Weak` handles: the simulator's point arena is
//! the sole owner of points, and certificates must never extend a point's
//! lifetime.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::observer::{PredictionChange, SubscriptionToken};
use crate::point::{Point, PointId};

/// Process-wide monotonic certificate id source.
static NEXT_CERTIFICATE_ID: AtomicU64 = AtomicU64::new(0);

/// Stable total-order key for a certificate, unique for the process
/// lifetime. Used as the ordered-index key and the scheduler tie-break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CertificateId(u64);

impl CertificateId {
    fn next() -> Self {
        Self(NEXT_CERTIFICATE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

// ─── User Predicate ─────────────────────────────────────────────────

/// The user-supplied algebraic predicate over two endpoints.
///
/// Implementations read endpoint positions and polynomials only; they must
/// not call back into certificate bookkeeping on either endpoint (the
/// engine may hold a certificate lock while evaluating).
pub trait CertificatePredicate: Send + Sync {
    /// The next time strictly after `now` at which the predicate stops
    /// holding, or `None` when it holds for all representable time.
    ///
    /// For a predicate expressible as `p(t) ≥ 0` this is
    /// `p.first_root_after(now)`.
    fn failure_time(&self, u: &Point, v: &Point, now: f64) -> Option<f64>;

    /// Whether the predicate holds at `now`, using current static data.
    fn evaluate_validity(&self, u: &Point, v: &Point, now: f64) -> bool;
}

// ─── Certificate Base ───────────────────────────────────────────────

struct ListenerPair {
    u_token: SubscriptionToken,
    v_token: SubscriptionToken,
}

/// Engine-side certificate: identity, endpoints, failure-time cache and
/// listener registration around a user predicate.
pub struct Certificate {
    id: CertificateId,
    u: Weak<Point>,
    v: Weak<Point>,
    u_id: PointId,
    v_id: PointId,
    predicate: Box<dyn CertificatePredicate>,
    /// Failure time computed at creation and re-cached on either
    /// endpoint's prediction change.
    failure_at_creation: Mutex<Option<f64>>,
    listeners: Mutex<Option<ListenerPair>>,
    disposed: AtomicBool,
}

impl Certificate {
    /// Create a certificate over `(u, v)`, cache its failure time at
    /// `now`, and subscribe the re-cache listener on both endpoints'
    /// `PredictionChanged` channels.
    ///
    /// The returned certificate is not yet in any point's live index;
    /// callers register it with [`Point::add_certificate`].
    pub fn register(
        u: &Arc<Point>,
        v: &Arc<Point>,
        predicate: Box<dyn CertificatePredicate>,
        now: f64,
    ) -> Arc<Self> {
        let cert = Arc::new(Self {
            id: CertificateId::next(),
            u: Arc::downgrade(u),
            v: Arc::downgrade(v),
            u_id: u.id(),
            v_id: v.id(),
            predicate,
            failure_at_creation: Mutex::new(None),
            listeners: Mutex::new(None),
            disposed: AtomicBool::new(false),
        });
        cert.refresh_failure_cache(now);

        let weak_u = Arc::downgrade(&cert);
        let u_token = u
            .prediction_changed()
            .subscribe(Box::new(move |change: &PredictionChange| {
                if let Some(cert) = weak_u.upgrade() {
                    cert.refresh_failure_cache(change.time);
                }
            }));
        let weak_v = Arc::downgrade(&cert);
        let v_token = v
            .prediction_changed()
            .subscribe(Box::new(move |change: &PredictionChange| {
                if let Some(cert) = weak_v.upgrade() {
                    cert.refresh_failure_cache(change.time);
                }
            }));
        *cert.listeners.lock() = Some(ListenerPair { u_token, v_token });
        cert
    }

    /// Stable id; the ordered-index key.
    #[inline]
    pub fn id(&self) -> CertificateId {
        self.id
    }

    /// Endpoint ids `(u, v)`.
    pub fn endpoints(&self) -> (PointId, PointId) {
        (self.u_id, self.v_id)
    }

    /// The cached failure-time-at-creation.
    pub fn failure_at_creation(&self) -> Option<f64> {
        *self.failure_at_creation.lock()
    }

    /// Recompute the failure time on demand (no cache update).
    pub fn failure_time(&self, now: f64) -> Option<f64> {
        let (u, v) = self.endpoints_upgraded()?;
        self.predicate.failure_time(&u, &v, now)
    }

    /// Whether the predicate currently holds. A certificate whose
    /// endpoints are gone reports valid — it can no longer fire.
    pub fn evaluate_validity(&self, now: f64) -> bool {
        match self.endpoints_upgraded() {
            Some((u, v)) => self.predicate.evaluate_validity(&u, &v, now),
            None => true,
        }
    }

    /// Re-cache `failure_at_creation` from a fresh computation at `now`.
    pub fn refresh_failure_cache(&self, now: f64) {
        let fresh = self.failure_time(now);
        *self.failure_at_creation.lock() = fresh;
    }

    /// Unhook both prediction-change listeners. Idempotent: only the
    /// first call unsubscribes.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(pair) = self.listeners.lock().take() {
            if let Some(u) = self.u.upgrade() {
                u.prediction_changed().unsubscribe(pair.u_token);
            }
            if let Some(v) = self.v.upgrade() {
                v.prediction_changed().unsubscribe(pair.v_token);
            }
        }
    }

    /// True once [`Certificate::dispose`] has run.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn endpoints_upgraded(&self) -> Option<(Arc<Point>, Arc<Point>)> {
        Some((self.u.upgrade()?, self.v.upgrade()?))
    }
}

impl std::fmt::Debug for Certificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Certificate")
            .field("id", &self.id)
            .field("u", &self.u_id)
            .field("v", &self.v_id)
            .field("failure_at_creation", &self.failure_at_creation())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ─── Ordered Index ──────────────────────────────────────────────────

/// Per-point ordered set of live certificates, keyed by the monotonic
/// [`CertificateId`] — a stable total order with no collision hazard.
#[derive(Debug, Default)]
pub struct CertificateIndex {
    map: BTreeMap<CertificateId, Arc<Certificate>>,
}

impl CertificateIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a certificate; returns false when it was already present.
    pub fn insert(&mut self, cert: Arc<Certificate>) -> bool {
        self.map.insert(cert.id(), cert).is_none()
    }

    /// Remove by id.
    pub fn remove(&mut self, id: CertificateId) -> Option<Arc<Certificate>> {
        self.map.remove(&id)
    }

    /// Membership by id.
    pub fn contains(&self, id: CertificateId) -> bool {
        self.map.contains_key(&id)
    }

    /// Iterate in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Certificate>> {
        self.map.values()
    }

    /// Number of live certificates.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// True when no certificate is live.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
