mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tilestitch_core::compute::cpu::PlannedTransform;
use tilestitch_core::config::StitchConfig;
use tilestitch_core::error::{Result, StitchError};
use tilestitch_core::grid::TileGrid;
use tilestitch_core::io::{MemorySource, PixelSource};
use tilestitch_core::optimize::{
    Orchestrator, RefineStats, RefinementStage, RepeatabilityRefinement, RunOutcome,
};
use tilestitch_core::tile::{CorrelationEstimate, Direction, GridPos};

use common::shifted_grid;

const STEP: usize = 16;

/// 2x3 grid with plausible estimates everywhere except the west edge of
/// (0, 1), which holds a low-scoring outlier.
fn grid_with_outlier() -> (TileGrid, MemorySource) {
    let (mut grid, source) = shifted_grid(2, 3, 32, 32, STEP, STEP);
    let step = STEP as i32;
    let mut set = |r, c, dir, est| {
        grid.tile_mut(GridPos::new(r, c)).unwrap().set_estimate(dir, est);
    };
    set(0, 1, Direction::West, CorrelationEstimate::new(0.2, 3, 7));
    set(0, 2, Direction::West, CorrelationEstimate::new(0.9, step, 1));
    set(1, 1, Direction::West, CorrelationEstimate::new(0.9, step, 0));
    set(1, 2, Direction::West, CorrelationEstimate::new(0.9, step, -1));
    for c in 0..3 {
        set(1, c, Direction::North, CorrelationEstimate::new(0.9, 0, step));
    }
    (grid, source)
}

// ---------------------------------------------------------------------------
// Direct refinement
// ---------------------------------------------------------------------------

#[test]
fn test_outlier_edge_is_researched_and_corrected() {
    let (mut grid, source) = grid_with_outlier();
    let stage = RepeatabilityRefinement::default();
    let stats = stage
        .refine(&mut grid, &source, &AtomicBool::new(false))
        .unwrap();

    assert_eq!(stats.edges_examined, 7);
    assert_eq!(stats.edges_refined, 1);
    assert_eq!(stats.repeatability_west, Some(1));
    assert_eq!(stats.repeatability_north, Some(0));

    let fixed = grid.tile(GridPos::new(0, 1)).unwrap().west.unwrap();
    assert_eq!((fixed.dx, fixed.dy), (STEP as i32, 0));
    assert!(fixed.score > 0.99, "score={}", fixed.score);

    // Edges inside the repeatability band are left alone.
    let kept = grid.tile(GridPos::new(0, 2)).unwrap().west.unwrap();
    assert_eq!((kept.dx, kept.dy, kept.score), (STEP as i32, 1, 0.9));
}

#[test]
fn test_refinement_observes_cancel_flag() {
    let (mut grid, source) = grid_with_outlier();
    let stage = RepeatabilityRefinement::default();
    let result = stage.refine(&mut grid, &source, &AtomicBool::new(true));

    assert!(matches!(result, Err(StitchError::Cancelled)), "{result:?}");
    let untouched = grid.tile(GridPos::new(0, 1)).unwrap().west.unwrap();
    assert_eq!((untouched.dx, untouched.dy), (3, 7));
}

// ---------------------------------------------------------------------------
// Through the orchestrator
// ---------------------------------------------------------------------------

/// Raises the run's cancel flag, then hands over to the default refinement.
struct CancelMidway(RepeatabilityRefinement);

impl RefinementStage for CancelMidway {
    fn name(&self) -> &str {
        "cancel-midway"
    }

    fn refine(&self, grid: &mut TileGrid, pixels: &dyn PixelSource, cancel: &AtomicBool) -> Result<RefineStats> {
        cancel.store(true, Ordering::Relaxed);
        self.0.refine(grid, pixels, cancel)
    }
}

fn orchestrator(grid: TileGrid, source: MemorySource) -> Orchestrator {
    Orchestrator::new(
        grid,
        StitchConfig::default(),
        Arc::new(PlannedTransform::new()),
        Arc::new(source),
    )
    .skip_alignment(true)
}

#[test]
fn test_orchestrated_refinement_corrects_outlier() {
    let (grid, source) = grid_with_outlier();
    let orch = orchestrator(grid, source);
    let summary = match orch.run() {
        RunOutcome::Completed(summary) => summary,
        other => panic!("expected completion, got {other:?}"),
    };
    assert_eq!(summary.refinement.unwrap().edges_refined, 1);

    let grid = orch.grid();
    let grid = grid.lock().unwrap();
    let tile = grid.tile(GridPos::new(0, 1)).unwrap();
    assert_eq!(tile.west.map(|e| (e.dx, e.dy)), Some((STEP as i32, 0)));
    assert_eq!(tile.pre_refinement_west.map(|e| (e.dx, e.dy)), Some((3, 7)));
}

#[test]
fn test_cancel_during_refinement_is_reported() {
    let (grid, source) = grid_with_outlier();
    let orch = orchestrator(grid, source)
        .with_refinement(Box::new(CancelMidway(RepeatabilityRefinement::default())));

    assert_eq!(orch.run(), RunOutcome::Cancelled);
    assert!(!orch.is_faulted());
}
