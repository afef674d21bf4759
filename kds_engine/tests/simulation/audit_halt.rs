//! Audit halt: an audit that rejects points with no certificates stops
//! the run at the first instant when no generator ever issues any.

use std::sync::Arc;

use kds_common::config::SimulatorConfig;
use kds_engine::{Audit, Capabilities, EngineError, Point, Simulator};

use super::support::{HoldMover, IdleAlgorithm, static_point};

/// Rejects any point with an empty certificate set.
struct RequireCertificates;

impl Audit for RequireCertificates {
    fn audit(&self, points: &[Arc<Point>]) -> Result<(), EngineError> {
        for point in points {
            if point.certificate_count() == 0 {
                return Err(EngineError::Audit(format!(
                    "point {:?} has no certificates",
                    point.id()
                )));
            }
        }
        Ok(())
    }
}

#[test]
fn audit_halts_first_instant() {
    let config = SimulatorConfig {
        end_time: 5.0,
        time_step: 1.0,
        ..SimulatorConfig::default()
    };
    let mut sim = Simulator::new(
        config,
        vec![static_point(0.0, 0.0), static_point(10.0, 0.0)],
        Capabilities::new(Box::new(HoldMover), Box::new(IdleAlgorithm { rounds: 1 }))
            .with_audit(Box::new(RequireCertificates)),
    )
    .unwrap();

    let err = sim.run().unwrap_err();
    assert!(matches!(err, EngineError::Audit(_)));

    // Halted mid-loop: the first instant never completed, state is
    // observable at the failure time.
    assert_eq!(sim.stats().instants, 0);
    assert_eq!(sim.current_time(), 1.0);
    assert_eq!(sim.points().len(), 2);
}
