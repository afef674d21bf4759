//! Internal/external classification: three failures against one reported
//! node change split 1 external + 2 internal, and the changed subset is
//! carried on the points-changed event.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use kds_common::config::SimulatorConfig;
use kds_engine::{
    Capabilities, Certificate, CertificateGenerator, EngineError, HookStatus, Node, Point,
    PointId, Simulator,
};

use super::support::{AlwaysFails, HoldMover, IdleAlgorithm, static_point};

/// Reports a fixed number of structural changes every instant.
struct FixedChangesNode(u64);

impl Node for FixedChangesNode {
    fn number_of_changes(&self) -> u64 {
        self.0
    }
}

/// Three always-failing certificates on point 0, issued once.
struct TripleFailureGenerator {
    done: AtomicBool,
}

impl CertificateGenerator for TripleFailureGenerator {
    fn rebuild_all(&self, points: &[Arc<Point>], now: f64) -> Result<HookStatus, EngineError> {
        if !self.done.swap(true, Ordering::Relaxed) {
            for _ in 0..3 {
                let cert =
                    Certificate::register(&points[0], &points[1], Box::new(AlwaysFails), now);
                points[0].add_certificate(cert);
            }
        }
        Ok(HookStatus::Handled)
    }
}

#[test]
fn three_failures_one_change_split() {
    let config = SimulatorConfig {
        end_time: 1.0,
        time_step: 1.0,
        ..SimulatorConfig::default()
    };
    let mut sim = Simulator::new(
        config,
        vec![
            static_point(0.0, 0.0).with_node(Box::new(FixedChangesNode(1))),
            static_point(5.0, 0.0),
        ],
        Capabilities::new(Box::new(HoldMover), Box::new(IdleAlgorithm { rounds: 1 }))
            .with_generator(Box::new(TripleFailureGenerator {
                done: AtomicBool::new(false),
            })),
    )
    .unwrap();

    let changed_ids = Arc::new(AtomicU64::new(u64::MAX));
    let seen = changed_ids.clone();
    sim.subscribe_points_changed(Box::new(move |event| {
        assert_eq!(event.changed.len(), 1);
        seen.store(event.changed[0].id().0 as u64, Ordering::Relaxed);
    }));

    let stats = sim.run().unwrap();

    let point = &sim.points()[0];
    assert_eq!(point.external_events(), 1);
    assert_eq!(point.internal_events(), 2);
    assert!(point.changed());
    assert_eq!(stats.certificates_retired, 3);
    assert_eq!(stats.internal_events + stats.external_events, 3);

    // The changed subset carried exactly point 0.
    assert_eq!(changed_ids.load(Ordering::Relaxed), 0);
    assert_eq!(sim.points()[1].id(), PointId(1));
}
