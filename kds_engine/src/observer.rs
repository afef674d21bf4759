//! Observer channels with token-based subscription.
//!
//! The engine has exactly four channels: per-point `PositionChanged` and
//! `PredictionChanged`, and the simulator-level tick events. Each channel
//! is an explicit observer list protected by its own mutex; callbacks are
//! held by value and removed by the token handed out at subscription.
//!
//! Callbacks run while the channel lock is held. They must not subscribe
//! or unsubscribe on the channel they fire from.

use std::sync::Arc;

use heapless::Vec as BoundedVec;
use kds_common::consts::MAX_AXES_LIMIT;
use kds_common::poly::Polynomial;
use parking_lot::Mutex;

use crate::point::{Point, PointId};

/// Identity token for one subscription; required for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

/// Boxed observer callback.
pub type Callback<E> = Box<dyn Fn(&E) + Send + Sync>;

// ─── Channel ────────────────────────────────────────────────────────

/// A single observer channel: subscribe, unsubscribe, emit.
pub struct Channel<E> {
    inner: Mutex<ListInner<E>>,
}

struct ListInner<E> {
    next_token: u64,
    entries: Vec<(SubscriptionToken, Callback<E>)>,
}

impl<E> Default for Channel<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Channel<E> {
    /// Create an empty channel.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ListInner {
                next_token: 0,
                entries: Vec::new(),
            }),
        }
    }

    /// Register a callback; the returned token removes it again.
    pub fn subscribe(&self, callback: Callback<E>) -> SubscriptionToken {
        let mut inner = self.inner.lock();
        let token = SubscriptionToken(inner.next_token);
        inner.next_token += 1;
        inner.entries.push((token, callback));
        token
    }

    /// Remove a subscription. Returns false when the token is unknown
    /// (already removed).
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|(t, _)| *t != token);
        inner.entries.len() != before
    }

    /// Invoke every registered callback with `event`.
    pub fn emit(&self, event: &E) {
        let inner = self.inner.lock();
        for (_, callback) in &inner.entries {
            callback(event);
        }
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// True when no subscription is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─── Event Payloads ─────────────────────────────────────────────────

/// A point absorbed a new position sample on every axis.
pub struct PositionChange {
    /// The moved point.
    pub point: PointId,
    /// New static position per axis.
    pub positions: BoundedVec<f64, MAX_AXES_LIMIT>,
    /// Simulation time of the movement.
    pub time: f64,
}

/// A point refit its predicted polynomials (all axes, one epoch).
pub struct PredictionChange {
    /// The refit point.
    pub point: PointId,
    /// Fresh predicted polynomial per axis.
    pub predicted: BoundedVec<Polynomial, MAX_AXES_LIMIT>,
    /// Simulation time of the refit.
    pub time: f64,
}

/// One simulation instant completed.
pub struct SimulationTick {
    /// The instant's time.
    pub time: f64,
    /// All points, in arena order.
    pub points: Vec<Arc<Point>>,
}

/// An instant completed with at least one structurally changed point.
pub struct SimulationPointsChanged {
    /// The instant's time.
    pub time: f64,
    /// All points, in arena order.
    pub points: Vec<Arc<Point>>,
    /// The points whose nodes reported changes this instant.
    pub changed: Vec<Arc<Point>>,
}

// ─── Tests ──────────────────────────────────────────────────────────
