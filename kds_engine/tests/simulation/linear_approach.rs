//! Linear approach: a fully polynomial-defined pair whose separation
//! certificate fails at t = 9. Event-driven mode jumps straight there,
//! retires exactly one certificate, and then jumps to the end time.

use std::sync::Arc;

use kds_common::config::SimulatorConfig;
use kds_common::poly::Polynomial;
use kds_engine::{Capabilities, Simulator};
use parking_lot::Mutex;

use super::support::{IdleAlgorithm, OnceSeparationGenerator, UnreachableMover, trajectory_point};

#[test]
fn linear_approach_jumps_to_failure_then_end() {
    let config = SimulatorConfig::default(); // end 1800, step 1
    // A at (t, 0), B at (10, 0): |AB| = 1 at t = 9.
    let mut sim = Simulator::new(
        config,
        vec![
            trajectory_point(Polynomial::new(vec![0.0, 1.0]), Polynomial::zero()),
            trajectory_point(Polynomial::constant(10.0), Polynomial::zero()),
        ],
        Capabilities::new(
            Box::new(UnreachableMover),
            Box::new(IdleAlgorithm { rounds: 1 }),
        )
        .with_generator(Box::new(OnceSeparationGenerator::new(1.0))),
    )
    .unwrap();

    let tick_times = Arc::new(Mutex::new(Vec::new()));
    let times = tick_times.clone();
    sim.subscribe_tick(Box::new(move |tick| {
        times.lock().push(tick.time);
    }));

    let stats = sim.run().unwrap();

    // Exactly two scheduler steps: 0 → 9 → end.
    assert_eq!(stats.instants, 2);
    assert_eq!(stats.event_driven_jumps, 1);
    assert_eq!(stats.stepped_advances, 0);
    assert_eq!(*tick_times.lock(), vec![9.0, 1800.0]);

    // Exactly one retirement, at t = 9.
    assert_eq!(stats.certificates_retired, 1);
    assert_eq!(stats.internal_events + stats.external_events, 1);
    assert_eq!(sim.points()[0].certificate_count(), 0);
}
