mod common;

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::thread;

use rayon::prelude::*;

use tilestitch_core::compute::cpu::PlannedTransform;
use tilestitch_core::config::StitchConfig;
use tilestitch_core::error::Result;
use tilestitch_core::grid::TileGrid;
use tilestitch_core::io::{MemorySource, PixelSource};
use tilestitch_core::optimize::{Orchestrator, RefineStats, RefinementStage, RunOutcome};
use tilestitch_core::tile::{CorrelationEstimate, Direction, GridPos};

use common::shifted_grid;

fn orchestrator(grid: TileGrid, source: MemorySource) -> Orchestrator {
    Orchestrator::new(
        grid,
        StitchConfig::default(),
        Arc::new(PlannedTransform::new()),
        Arc::new(source),
    )
}

struct PanickingStage;

impl RefinementStage for PanickingStage {
    fn name(&self) -> &str {
        "panicking"
    }

    fn refine(&self, _: &mut TileGrid, _: &dyn PixelSource, _: &AtomicBool) -> Result<RefineStats> {
        panic!("refinement exploded");
    }
}

/// Panics on a rayon worker rather than the calling thread.
struct ParallelPanickingStage;

impl RefinementStage for ParallelPanickingStage {
    fn name(&self) -> &str {
        "parallel-panicking"
    }

    fn refine(&self, _: &mut TileGrid, _: &dyn PixelSource, _: &AtomicBool) -> Result<RefineStats> {
        (0..64).into_par_iter().for_each(|i| {
            if i == 37 {
                panic!("edge {i} exploded");
            }
        });
        Ok(RefineStats::default())
    }
}

/// Overwrites every west estimate.
struct ScramblingStage;

impl RefinementStage for ScramblingStage {
    fn name(&self) -> &str {
        "scrambling"
    }

    fn refine(&self, grid: &mut TileGrid, _: &dyn PixelSource, _: &AtomicBool) -> Result<RefineStats> {
        for tile in grid.tiles_mut() {
            if tile.west.is_some() {
                tile.set_estimate(Direction::West, CorrelationEstimate::new(0.1, 99, 99));
            }
        }
        Ok(RefineStats::default())
    }
}

#[test]
fn test_completed_run_reports_stats_and_backups() {
    let (grid, source) = shifted_grid(2, 3, 32, 32, 16, 16);
    let orch = orchestrator(grid, source);
    let outcome = orch.run();

    let summary = match outcome {
        RunOutcome::Completed(summary) => summary,
        other => panic!("unexpected outcome: {other:?}"),
    };
    let traversal = summary.traversal.unwrap();
    assert_eq!(traversal.pairs_correlated, 7);
    assert_eq!(summary.refinement.unwrap().edges_examined, 7);
    assert!(!orch.is_faulted());

    let grid = orch.grid();
    let grid = grid.lock().unwrap();
    let tile = grid.tile(GridPos::new(1, 2)).unwrap();
    assert_eq!(tile.west.map(|e| (e.dx, e.dy)), Some((16, 0)));
    assert_eq!(tile.north.map(|e| (e.dx, e.dy)), Some((0, 16)));
    assert_eq!(tile.pre_refinement_west, tile.west);
}

#[test]
fn test_missing_tile_is_soft_cancel() {
    let (grid, mut source) = shifted_grid(2, 2, 16, 16, 8, 8);
    source.remove("tile_r0_c1.png");
    let orch = orchestrator(grid, source);
    assert_eq!(orch.run(), RunOutcome::Cancelled);
    assert!(!orch.is_faulted());
    assert!(orch.fault().is_none());
}

#[test]
fn test_panicking_refinement_is_captured() {
    let (grid, source) = shifted_grid(2, 2, 16, 16, 8, 8);
    let orch = orchestrator(grid, source).with_refinement(Box::new(PanickingStage));
    let outcome = orch.run();

    assert!(matches!(outcome, RunOutcome::Faulted(_)));
    assert!(orch.is_faulted());
    let fault = orch.fault().unwrap();
    assert_eq!(fault.stage, "Refining translations");
    assert!(fault.message.contains("refinement exploded"), "{fault}");
}

#[test]
fn test_panic_on_rayon_worker_is_captured() {
    let (grid, source) = shifted_grid(2, 2, 16, 16, 8, 8);
    let orch = orchestrator(grid, source).with_refinement(Box::new(ParallelPanickingStage));
    assert!(matches!(orch.run(), RunOutcome::Faulted(_)));
    assert!(orch.fault().unwrap().message.contains("exploded"));

    // The grid stays usable after the fault.
    let grid = orch.grid();
    let guard = grid.lock().unwrap_or_else(|e| e.into_inner());
    assert_eq!(guard.tiles().len(), 4);
}

#[test]
fn test_cancel_before_run() {
    let (grid, source) = shifted_grid(2, 2, 16, 16, 8, 8);
    let orch = orchestrator(grid, source);
    orch.cancel();
    assert_eq!(orch.run(), RunOutcome::Cancelled);
    assert!(orch.is_cancelled());

    let grid = orch.grid();
    let grid = grid.lock().unwrap();
    assert!(grid.tiles().iter().all(|t| t.west.is_none() && t.north.is_none()));
}

#[test]
fn test_restore_pre_refinement() {
    let (grid, source) = shifted_grid(1, 3, 16, 16, 8, 8);
    let orch = orchestrator(grid, source).with_refinement(Box::new(ScramblingStage));
    assert!(matches!(orch.run(), RunOutcome::Completed(_)));

    {
        let grid = orch.grid();
        let grid = grid.lock().unwrap();
        let west = grid.tile(GridPos::new(0, 1)).unwrap().west.unwrap();
        assert_eq!((west.dx, west.dy), (99, 99));
    }

    orch.restore_pre_refinement();
    let grid = orch.grid();
    let grid = grid.lock().unwrap();
    let west = grid.tile(GridPos::new(0, 1)).unwrap().west.unwrap();
    assert_eq!((west.dx, west.dy), (8, 0));
}

#[test]
fn test_spawn_runs_on_named_worker() {
    let (grid, source) = shifted_grid(1, 2, 16, 16, 8, 8);
    let seen = Arc::new(Mutex::new(None));
    struct Recorder(Arc<Mutex<Option<String>>>);
    impl RefinementStage for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }
        fn refine(&self, _: &mut TileGrid, _: &dyn PixelSource, _: &AtomicBool) -> Result<RefineStats> {
            *self.0.lock().unwrap() = thread::current().name().map(str::to_string);
            Ok(RefineStats::default())
        }
    }

    let orch = Arc::new(orchestrator(grid, source).with_refinement(Box::new(Recorder(Arc::clone(&seen)))));
    let handle = Arc::clone(&orch).spawn().unwrap();
    assert!(matches!(handle.join().unwrap(), RunOutcome::Completed(_)));
    assert_eq!(seen.lock().unwrap().as_deref(), Some("tilestitch-optimizer"));
}

#[test]
fn test_skip_alignment_refines_existing_estimates() {
    let (grid, source) = shifted_grid(1, 2, 16, 16, 8, 8);
    let mut grid = grid;
    grid.tile_mut(GridPos::new(0, 1))
        .unwrap()
        .set_estimate(Direction::West, CorrelationEstimate::new(0.9, 8, 0));
    let orch = orchestrator(grid, source).skip_alignment(true);
    let summary = match orch.run() {
        RunOutcome::Completed(summary) => summary,
        other => panic!("expected completion, got {other:?}"),
    };
    assert!(summary.traversal.is_none());
    assert_eq!(summary.refinement.unwrap().edges_examined, 1);
}
