//! The round driver: per-instant phase sequence and the outer run loop.
//!
//! Each instant runs, in order: advance time → move (statics only) →
//! localized hooks → global pass → per-point rounds → certificate GC →
//! event classification → certificate rebuild → audit → event emission.
//! The driver is single-threaded between phases; the per-point rounds and
//! the per-point rebuild fan out over the worker pool with a barrier
//! between rounds. Optional capability hooks that report themselves
//! unimplemented are memoised and never called again.

use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, error, info};

use kds_common::config::SimulatorConfig;

use crate::capability::{
    AlgorithmCode, Audit, CertificateGenerator, HookStatus, Mover, NodeInitializer,
};
use crate::error::EngineError;
use crate::observer::{Channel, SimulationPointsChanged, SimulationTick, SubscriptionToken};
use crate::point::{Point, PointDefinition, PointId, RoundOutcome};
use crate::schedule::{AdvanceMode, Scheduler};

// ─── Run Statistics ─────────────────────────────────────────────────

/// O(1)-updated statistics for one simulation run.
///
/// Updated every instant with no allocation; per-point counters are
/// folded in when the run completes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    /// Instants executed.
    pub instants: u64,
    /// Event-driven scheduler jumps.
    pub event_driven_jumps: u64,
    /// Discrete fallback advances.
    pub stepped_advances: u64,
    /// Certificates retired and disposed.
    pub certificates_retired: u64,
    /// Failures classified as internal events (summed over points).
    pub internal_events: u64,
    /// Failures classified as external events (summed over points).
    pub external_events: u64,
    /// Messages sent (summed over points).
    pub messages_sent: u64,
    /// Prediction refits (summed over points).
    pub predictions_recomputed: u64,
    /// Simulation time when the run ended.
    pub final_time: f64,
}

// ─── Capabilities ───────────────────────────────────────────────────

/// The user capability bundle consumed by the driver. Mover and
/// algorithm are mandatory; the rest are optional collaborators.
pub struct Capabilities {
    /// Position writer, invoked while any axis is statically defined.
    pub mover: Box<dyn Mover>,
    /// The repair algorithm.
    pub algorithm: Box<dyn AlgorithmCode>,
    /// One-shot node setup.
    pub initializer: Option<Box<dyn NodeInitializer>>,
    /// Certificate reissue after repairs.
    pub generator: Option<Box<dyn CertificateGenerator>>,
    /// End-of-instant consistency check.
    pub audit: Option<Box<dyn Audit>>,
}

impl Capabilities {
    /// Bundle with the two mandatory capabilities.
    pub fn new(mover: Box<dyn Mover>, algorithm: Box<dyn AlgorithmCode>) -> Self {
        Self {
            mover,
            algorithm,
            initializer: None,
            generator: None,
            audit: None,
        }
    }

    /// Attach a node initializer.
    pub fn with_initializer(mut self, initializer: Box<dyn NodeInitializer>) -> Self {
        self.initializer = Some(initializer);
        self
    }

    /// Attach a certificate generator.
    pub fn with_generator(mut self, generator: Box<dyn CertificateGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Attach an audit.
    pub fn with_audit(mut self, audit: Box<dyn Audit>) -> Self {
        self.audit = Some(audit);
        self
    }
}

/// Memoised support flags for the optional capability hooks. A hook that
/// reports [`HookStatus::NotImplemented`] once is never called again.
struct HookSupport {
    per_point: bool,
    after_all_moved: bool,
    after_single_moved: bool,
    rebuild_all: bool,
    rebuild_for_point: bool,
}

impl Default for HookSupport {
    fn default() -> Self {
        Self {
            per_point: true,
            after_all_moved: true,
            after_single_moved: true,
            rebuild_all: true,
            rebuild_for_point: true,
        }
    }
}

// ─── Simulator ──────────────────────────────────────────────────────

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator").finish_non_exhaustive()
    }
}

/// The simulation driver: owns the point arena, the scheduler, the user
/// capabilities, and the engine event channels.
pub struct Simulator {
    config: SimulatorConfig,
    points: Vec<Arc<Point>>,
    scheduler: Scheduler,
    previous_move_time: Option<f64>,
    mover: Box<dyn Mover>,
    algorithm: Box<dyn AlgorithmCode>,
    initializer: Option<Box<dyn NodeInitializer>>,
    generator: Option<Box<dyn CertificateGenerator>>,
    audit: Option<Box<dyn Audit>>,
    support: HookSupport,
    stats: RunStats,
    tick: Channel<SimulationTick>,
    points_changed: Channel<SimulationPointsChanged>,
    initialized: bool,
}

impl Simulator {
    /// Build a simulator: validate the configuration, create the point
    /// arena from the definitions, and wire the capabilities.
    pub fn new(
        config: SimulatorConfig,
        definitions: Vec<PointDefinition>,
        capabilities: Capabilities,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        for (i, definition) in definitions.iter().enumerate() {
            if definition.axes.len() != config.axis_count {
                return Err(EngineError::Definition(format!(
                    "point {i} has {} axes, configuration expects {}",
                    definition.axes.len(),
                    config.axis_count
                )));
            }
        }
        let points = definitions
            .into_iter()
            .enumerate()
            .map(|(i, definition)| Point::create(PointId(i), definition, &config))
            .collect();
        let scheduler = Scheduler::new(&config);
        Ok(Self {
            config,
            points,
            scheduler,
            previous_move_time: None,
            mover: capabilities.mover,
            algorithm: capabilities.algorithm,
            initializer: capabilities.initializer,
            generator: capabilities.generator,
            audit: capabilities.audit,
            support: HookSupport::default(),
            stats: RunStats::default(),
            tick: Channel::new(),
            points_changed: Channel::new(),
            initialized: false,
        })
    }

    /// The point arena, in id order.
    pub fn points(&self) -> &[Arc<Point>] {
        &self.points
    }

    /// Current simulation time.
    pub fn current_time(&self) -> f64 {
        self.scheduler.current_time()
    }

    /// The active configuration.
    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Statistics accumulated so far.
    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Observe every completed instant.
    pub fn subscribe_tick(
        &self,
        callback: Box<dyn Fn(&SimulationTick) + Send + Sync>,
    ) -> SubscriptionToken {
        self.tick.subscribe(callback)
    }

    /// Observe instants with at least one structurally changed point.
    pub fn subscribe_points_changed(
        &self,
        callback: Box<dyn Fn(&SimulationPointsChanged) + Send + Sync>,
    ) -> SubscriptionToken {
        self.points_changed.subscribe(callback)
    }

    /// Run the simulation to the end time or the first audit failure.
    pub fn run(&mut self) -> Result<RunStats, EngineError> {
        let result = self.run_inner();
        if let Err(e) = &result {
            error!(error = %e, time = self.scheduler.current_time(), "simulation halted");
        }
        result
    }

    fn run_inner(&mut self) -> Result<RunStats, EngineError> {
        self.initialize()?;
        info!(
            points = self.points.len(),
            start = self.config.start_time,
            end = self.config.end_time,
            predictions = self.config.enable_predictions,
            "simulation starting"
        );
        loop {
            let (now, mode) = self.scheduler.advance(&self.points);
            match mode {
                AdvanceMode::EventDriven => self.stats.event_driven_jumps += 1,
                AdvanceMode::Stepped => self.stats.stepped_advances += 1,
                AdvanceMode::Exhausted => {}
            }
            self.execute_instant(now)?;
            self.stats.instants += 1;
            if self.scheduler.finished() {
                break;
            }
        }
        self.finalize_stats();
        info!(
            instants = self.stats.instants,
            retired = self.stats.certificates_retired,
            final_time = self.stats.final_time,
            "simulation finished"
        );
        Ok(self.stats.clone())
    }

    /// One-shot setup: node initializer, then the initial certificate
    /// build at the start time.
    fn initialize(&mut self) -> Result<(), EngineError> {
        if self.initialized {
            return Ok(());
        }
        self.initialized = true;
        if let Some(initializer) = &self.initializer {
            initializer.compute_initial_values(&self.points)?;
        }
        self.rebuild_certificates(self.config.start_time)
    }

    /// The per-instant phase sequence.
    fn execute_instant(&mut self, now: f64) -> Result<(), EngineError> {
        debug!(time = now, "instant");
        self.move_points(now)?;
        self.global_pass(now)?;
        self.run_rounds(now)?;
        self.collect_garbage();
        self.classify_events();
        self.rebuild_certificates(now)?;
        self.run_audit()?;
        self.emit_events(now);
        Ok(())
    }

    /// Movement phase: invoke the mover while any axis anywhere is
    /// statically defined, then raise the localized hook once per moved
    /// point. Fully polynomial-defined runs skip the phase entirely.
    fn move_points(&mut self, now: f64) -> Result<(), EngineError> {
        if !self.points.iter().any(|p| p.any_static()) {
            return Ok(());
        }
        self.mover
            .move_points(&self.points, now, self.previous_move_time)?;
        self.previous_move_time = Some(now);

        let moved: Vec<Arc<Point>> = self
            .points
            .iter()
            .filter(|p| p.take_moved())
            .cloned()
            .collect();
        if self.support.after_single_moved {
            for point in &moved {
                let failed = point.failed_certificates(now);
                match self
                    .algorithm
                    .run_after_single_point_moved(&failed, &self.points, now)?
                {
                    HookStatus::Handled => {}
                    HookStatus::NotImplemented => {
                        self.support.after_single_moved = false;
                        debug!("run_after_single_point_moved unsupported; hook disabled");
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    /// Global pass: gather failures across all points, wipe every
    /// message queue, and raise the centralized hook.
    fn global_pass(&mut self, now: f64) -> Result<(), EngineError> {
        let mut failed = Vec::new();
        for point in &self.points {
            failed.extend(point.failed_certificates(now));
        }
        for point in &self.points {
            point.clear_messages();
        }
        if self.support.after_all_moved {
            match self
                .algorithm
                .run_after_all_points_moved(&failed, &self.points, now)?
            {
                HookStatus::Handled => {}
                HookStatus::NotImplemented => {
                    self.support.after_all_moved = false;
                    debug!("run_after_all_points_moved unsupported; hook disabled");
                }
            }
        }
        Ok(())
    }

    /// Per-point rounds: `max_iteration_count` parallel passes with a
    /// full barrier between rounds. The round-0 queue wipe runs before
    /// the fan-out so no round-0 send can race a clear.
    fn run_rounds(&mut self, now: f64) -> Result<(), EngineError> {
        if !self.support.per_point {
            return Ok(());
        }
        let rounds = self.algorithm.max_iteration_count();
        if rounds == 0 {
            return Ok(());
        }

        for point in &self.points {
            if !point.failed_certificates(now).is_empty() {
                point.clear_messages();
            }
        }

        let points = &self.points;
        let algorithm = self.algorithm.as_ref();
        for round in 0..rounds {
            let outcomes: Result<Vec<RoundOutcome>, EngineError> = points
                .par_iter()
                .map(|point| point.run_algorithm(round, algorithm, points, now))
                .collect();
            if outcomes?.contains(&RoundOutcome::Unsupported) {
                self.support.per_point = false;
                debug!("per_point unsupported; rounds disabled");
                break;
            }
        }
        Ok(())
    }

    /// Certificate GC: dispose every graveyard entry and count the
    /// retirements.
    fn collect_garbage(&mut self) {
        for point in &self.points {
            self.stats.certificates_retired += point.collect_garbage();
        }
    }

    /// Event classification per point under the configured policy.
    fn classify_events(&mut self) {
        for point in &self.points {
            point.classify_events(self.config.classification);
        }
    }

    /// Certificate rebuild: global hook first, then the per-point hook
    /// across the worker pool. Either may be memoised away.
    fn rebuild_certificates(&mut self, now: f64) -> Result<(), EngineError> {
        let Some(generator) = self.generator.as_deref() else {
            return Ok(());
        };
        if self.support.rebuild_all {
            match generator.rebuild_all(&self.points, now)? {
                HookStatus::Handled => {}
                HookStatus::NotImplemented => {
                    self.support.rebuild_all = false;
                    debug!("rebuild_all unsupported; hook disabled");
                }
            }
        }
        if self.support.rebuild_for_point {
            let statuses: Result<Vec<HookStatus>, EngineError> = self
                .points
                .par_iter()
                .map(|point| generator.rebuild_for_point(point, now))
                .collect();
            if statuses?.contains(&HookStatus::NotImplemented) {
                self.support.rebuild_for_point = false;
                debug!("rebuild_for_point unsupported; hook disabled");
            }
        }
        Ok(())
    }

    /// Audit phase: an error terminates the run with state observable.
    fn run_audit(&self) -> Result<(), EngineError> {
        if let Some(audit) = &self.audit {
            audit.audit(&self.points)?;
        }
        Ok(())
    }

    /// Emit the tick, and the changed-points event when any node
    /// reported structural changes this instant.
    fn emit_events(&self, now: f64) {
        self.tick.emit(&SimulationTick {
            time: now,
            points: self.points.clone(),
        });
        let changed: Vec<Arc<Point>> = self
            .points
            .iter()
            .filter(|p| p.changed())
            .cloned()
            .collect();
        if !changed.is_empty() {
            self.points_changed.emit(&SimulationPointsChanged {
                time: now,
                points: self.points.clone(),
                changed,
            });
        }
    }

    /// Fold per-point counters into the run statistics.
    fn finalize_stats(&mut self) {
        self.stats.internal_events = self.points.iter().map(|p| p.internal_events()).sum();
        self.stats.external_events = self.points.iter().map(|p| p.external_events()).sum();
        self.stats.messages_sent = self.points.iter().map(|p| p.sent_messages()).sum();
        self.stats.predictions_recomputed = self
            .points
            .iter()
            .map(|p| p.recomputed_polynomials())
            .sum();
        self.stats.final_time = self.scheduler.current_time();
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
