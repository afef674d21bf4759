//! Decentralized ping: point 0 sends a type-1 message in round 0,
//! point 1 drains it in round 1. Sent/received counters come out 1/1.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use kds_common::config::SimulatorConfig;
use kds_engine::{
    AlgorithmCode, Capabilities, CertificateGenerator, Certificate, EngineError, HookStatus,
    Point, PointDefinition, PointId, Simulator,
};

use super::support::{AlwaysFails, HoldMover, static_point};

const PING: u32 = 1;

/// Round 0: point 0 pings point 1. Round 1: point 1 drains the ping.
struct PingAlgorithm {
    drained: Arc<AtomicU64>,
}

impl AlgorithmCode for PingAlgorithm {
    fn max_iteration_count(&self) -> usize {
        2
    }

    fn per_point(
        &self,
        round: usize,
        _failed: &[Arc<Certificate>],
        point: &Arc<Point>,
        points: &[Arc<Point>],
        _now: f64,
    ) -> Result<HookStatus, EngineError> {
        if round == 0 && point.id() == PointId(0) {
            point.send_message(&points[1], PING, point);
        }
        if round == 1 && point.id() == PointId(1) {
            let senders = point.receive_messages(PING);
            self.drained
                .fetch_add(senders.len() as u64, Ordering::Relaxed);
        }
        Ok(HookStatus::Handled)
    }
}

/// One always-failing certificate per point so every point participates
/// in the rounds.
struct FailingPairGenerator {
    done: AtomicBool,
}

impl CertificateGenerator for FailingPairGenerator {
    fn rebuild_all(&self, points: &[Arc<Point>], now: f64) -> Result<HookStatus, EngineError> {
        if !self.done.swap(true, Ordering::Relaxed) {
            for (a, b) in [(0, 1), (1, 0)] {
                let cert =
                    Certificate::register(&points[a], &points[b], Box::new(AlwaysFails), now);
                points[a].add_certificate(cert);
            }
        }
        Ok(HookStatus::Handled)
    }
}

fn ping_definitions() -> Vec<PointDefinition> {
    vec![static_point(0.0, 0.0), static_point(5.0, 0.0)]
}

#[test]
fn ping_crosses_rounds() {
    let config = SimulatorConfig {
        end_time: 1.0,
        time_step: 1.0,
        ..SimulatorConfig::default()
    };
    let drained = Arc::new(AtomicU64::new(0));
    let mut sim = Simulator::new(
        config,
        ping_definitions(),
        Capabilities::new(
            Box::new(HoldMover),
            Box::new(PingAlgorithm {
                drained: drained.clone(),
            }),
        )
        .with_generator(Box::new(FailingPairGenerator {
            done: AtomicBool::new(false),
        })),
    )
    .unwrap();

    sim.run().unwrap();

    let points = sim.points();
    assert_eq!(points[0].sent_messages(), 1);
    assert_eq!(points[1].received_messages(), 1);
    assert_eq!(drained.load(Ordering::Relaxed), 1);
    // The ping was consumed; nothing lingers in the queue.
    assert_eq!(points[1].queued_messages(), 0);
}

#[test]
fn second_drain_returns_nothing() {
    let config = SimulatorConfig::default();
    let a = Point::create(PointId(0), static_point(0.0, 0.0), &config);
    let b = Point::create(PointId(1), static_point(1.0, 0.0), &config);

    a.send_message(&b, PING, &a);
    assert_eq!(b.receive_messages(PING).len(), 1);
    assert!(b.receive_messages(PING).is_empty());
    assert_eq!(b.received_messages(), 1);
}
