use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{error, info, warn};

use crate::compute::TransformProvider;
use crate::config::StitchConfig;
use crate::consts::WORKER_THREAD_NAME;
use crate::error::StitchError;
use crate::grid::TileGrid;
use crate::io::PixelSource;
use crate::stitch::{traverse, NoOpReporter, ProgressReporter, Stage, TraversalStats};

use super::refine::{RefineStats, RefinementStage, RepeatabilityRefinement};

/// A failure captured on the optimization worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerFault {
    pub stage: String,
    pub message: String,
}

impl fmt::Display for WorkerFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.message)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub traversal: Option<TraversalStats>,
    pub refinement: Option<RefineStats>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RunOutcome {
    Completed(RunSummary),
    /// Stopped by [`Orchestrator::cancel`] or by missing tile images.
    Cancelled,
    Faulted(WorkerFault),
}

/// Runs alignment and refinement over a shared grid, capturing faults
/// instead of propagating them.
pub struct Orchestrator {
    grid: Arc<Mutex<TileGrid>>,
    config: StitchConfig,
    provider: Arc<dyn TransformProvider>,
    pixels: Arc<dyn PixelSource>,
    refinement: Box<dyn RefinementStage>,
    reporter: Arc<dyn ProgressReporter>,
    skip_alignment: bool,
    cancelled: AtomicBool,
    stage: Mutex<Option<Stage>>,
    fault: Mutex<Option<WorkerFault>>,
}

impl Orchestrator {
    pub fn new(
        grid: TileGrid,
        config: StitchConfig,
        provider: Arc<dyn TransformProvider>,
        pixels: Arc<dyn PixelSource>,
    ) -> Self {
        let refinement = Box::new(RepeatabilityRefinement::new(config.refinement.clone()));
        Self {
            grid: Arc::new(Mutex::new(grid)),
            config,
            provider,
            pixels,
            refinement,
            reporter: Arc::new(NoOpReporter),
            skip_alignment: false,
            cancelled: AtomicBool::new(false),
            stage: Mutex::new(None),
            fault: Mutex::new(None),
        }
    }

    pub fn with_refinement(mut self, stage: Box<dyn RefinementStage>) -> Self {
        self.refinement = stage;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Use the estimates already on the grid instead of computing them.
    pub fn skip_alignment(mut self, skip: bool) -> Self {
        self.skip_alignment = skip;
        self
    }

    pub fn grid(&self) -> Arc<Mutex<TileGrid>> {
        Arc::clone(&self.grid)
    }

    pub fn config(&self) -> &StitchConfig {
        &self.config
    }

    /// Request a cooperative stop. Takes effect at the next stage boundary
    /// or refinement edge.
    pub fn cancel(&self) {
        info!("Cancellation requested");
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn is_faulted(&self) -> bool {
        lock(&self.fault).is_some()
    }

    pub fn fault(&self) -> Option<WorkerFault> {
        lock(&self.fault).clone()
    }

    /// Put the pre-refinement estimates back so refinement can be retried
    /// without recomputing the alignment.
    pub fn restore_pre_refinement(&self) {
        lock(&self.grid).restore_translations();
    }

    /// Run every stage on the calling thread.
    pub fn run(&self) -> RunOutcome {
        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| self.run_stages())) {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(fault)) => self.record(fault),
            Err(payload) => {
                let current = *lock(&self.stage);
                let stage = current
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "setup".to_string());
                self.record(WorkerFault {
                    stage,
                    message: panic_message(payload.as_ref()),
                })
            }
        };
        *lock(&self.stage) = None;
        outcome
    }

    /// Run on a named background thread.
    pub fn spawn(self: Arc<Self>) -> std::io::Result<JoinHandle<RunOutcome>> {
        thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || self.run())
    }

    fn run_stages(&self) -> Result<RunOutcome, WorkerFault> {
        let mut summary = RunSummary::default();
        if self.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }

        if !self.skip_alignment {
            self.enter(Stage::Alignment);
            let mut grid = lock(&self.grid);
            let result = traverse(
                &mut grid,
                self.config.traversal,
                self.provider.as_ref(),
                self.pixels.as_ref(),
                &self.config.alignment,
                self.reporter.as_ref(),
            );
            match result {
                Ok(stats) => summary.traversal = Some(stats),
                Err(StitchError::MissingTiles(paths)) => {
                    warn!(missing = paths.len(), "Tile images missing, optimization skipped");
                    return Ok(RunOutcome::Cancelled);
                }
                Err(e) => return Err(fault_in(Stage::Alignment, e)),
            }
        }

        if self.is_cancelled() {
            return Ok(RunOutcome::Cancelled);
        }
        lock(&self.grid).backup_translations();

        if self.config.refinement.enabled {
            self.enter(Stage::Refinement);
            self.reporter.begin_stage(Stage::Refinement, None);
            let mut grid = lock(&self.grid);
            let result = self
                .refinement
                .refine(&mut grid, self.pixels.as_ref(), &self.cancelled);
            self.reporter.finish_stage();
            match result {
                Ok(stats) => summary.refinement = Some(stats),
                Err(StitchError::Cancelled) => return Ok(RunOutcome::Cancelled),
                Err(e) if e.is_missing_resource() => {
                    warn!(error = %e, "Tile image missing during refinement");
                    return Ok(RunOutcome::Cancelled);
                }
                Err(e) => return Err(fault_in(Stage::Refinement, e)),
            }
        }

        Ok(RunOutcome::Completed(summary))
    }

    fn enter(&self, stage: Stage) {
        info!(%stage, "Starting stage");
        *lock(&self.stage) = Some(stage);
    }

    fn record(&self, fault: WorkerFault) -> RunOutcome {
        error!(stage = %fault.stage, message = %fault.message, "Optimization worker faulted");
        *lock(&self.fault) = Some(fault.clone());
        RunOutcome::Faulted(fault)
    }
}

fn fault_in(stage: Stage, error: StitchError) -> WorkerFault {
    WorkerFault {
        stage: stage.to_string(),
        message: error.to_string(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Lock, recovering the data if a faulted stage poisoned the mutex.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
