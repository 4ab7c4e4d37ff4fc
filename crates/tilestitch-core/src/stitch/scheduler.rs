use std::path::PathBuf;

use tracing::{debug, error, info};

use crate::align::phase_correlation_alignment;
use crate::compute::{Scratch, TransformProvider};
use crate::config::{AlignmentConfig, TraversalOrder};
use crate::error::{Result, StitchError};
use crate::grid::{Traversal, TileGrid};
use crate::io::PixelSource;
use crate::tile::{CorrelationEstimate, Direction, GridPos};

use super::lifecycle::LifecycleManager;
use super::types::{ProgressReporter, Stage};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TraversalStats {
    pub tiles_visited: usize,
    pub pairs_correlated: usize,
    pub transforms_computed: usize,
    pub transforms_released: usize,
    pub peak_live_transforms: usize,
}

/// Correlate every adjacent pair of the grid's sub-region, visiting tiles in
/// `order`.
///
/// A pair is correlated when its second tile is visited and the estimate is
/// stored on the east/south tile. Each tile's transform is freed as soon as
/// its last pair is done. Tiles whose image is missing get sentinel
/// estimates; traversal still finishes and then reports
/// [`StitchError::MissingTiles`]. Any other error stops the traversal, and
/// every transform still live is released before it is returned.
pub fn traverse(
    grid: &mut TileGrid,
    order: TraversalOrder,
    provider: &dyn TransformProvider,
    pixels: &dyn PixelSource,
    config: &AlignmentConfig,
    reporter: &dyn ProgressReporter,
) -> Result<TraversalStats> {
    grid.init_pending_uses();
    let traversal = Traversal::new(order, grid.region());
    let mut lifecycle = LifecycleManager::new(provider, pixels);
    let mut stats = TraversalStats::default();
    let mut missing: Vec<PathBuf> = Vec::new();

    info!(
        order = %order,
        tiles = traversal.len(),
        backend = provider.name(),
        "Computing pairwise translations"
    );
    reporter.begin_stage(Stage::Alignment, Some(traversal.len()));

    let visited = visit_all(
        grid,
        traversal,
        &mut lifecycle,
        provider,
        config,
        reporter,
        &mut stats,
        &mut missing,
    );
    reporter.finish_stage();

    if let Err(e) = visited {
        let released = lifecycle.abort(grid);
        error!(error = %e, released, "Traversal aborted, live transforms released");
        return Err(e);
    }

    let lifecycle_stats = lifecycle.stats();
    stats.transforms_computed = lifecycle_stats.computed;
    stats.transforms_released = lifecycle_stats.released;
    stats.peak_live_transforms = lifecycle_stats.peak_live;

    info!(
        pairs = stats.pairs_correlated,
        peak_live = stats.peak_live_transforms,
        "Pairwise translations complete"
    );

    if missing.is_empty() {
        Ok(stats)
    } else {
        Err(StitchError::MissingTiles(missing))
    }
}

#[allow(clippy::too_many_arguments)]
fn visit_all(
    grid: &mut TileGrid,
    traversal: Traversal,
    lifecycle: &mut LifecycleManager<'_>,
    provider: &dyn TransformProvider,
    config: &AlignmentConfig,
    reporter: &dyn ProgressReporter,
    stats: &mut TraversalStats,
    missing: &mut Vec<PathBuf>,
) -> Result<()> {
    let cols = grid.cols();
    let index = |pos: GridPos| pos.row * cols + pos.col;
    let mut visited = vec![false; grid.rows() * cols];
    let mut failed = vec![false; grid.rows() * cols];
    let mut scratch = provider.new_scratch(0, 0);

    for pos in traversal {
        let tile = grid
            .tile_mut(pos)
            .ok_or_else(|| StitchError::InvalidRegion(format!("tile {pos} outside the grid")))?;

        match lifecycle.acquire(tile, &mut scratch) {
            Ok(()) => {}
            Err(StitchError::MissingTile { path }) => {
                error!(tile = %pos, path = %path.display(), "Tile image not found");
                failed[index(pos)] = true;
                missing.push(path);
            }
            Err(e) => return Err(e),
        }
        visited[index(pos)] = true;
        stats.tiles_visited += 1;

        for (neighbor, current, dir) in pairs_of(grid, pos) {
            let other = if neighbor == pos { current } else { neighbor };
            if !visited[index(other)] {
                continue;
            }
            let degenerate = failed[index(neighbor)] || failed[index(current)];
            correlate_pair(
                grid,
                lifecycle,
                (neighbor, current, dir),
                degenerate,
                provider,
                &mut scratch,
                config,
            )?;
            stats.pairs_correlated += 1;
        }

        reporter.advance(stats.tiles_visited);
    }
    Ok(())
}

/// Pairs `(neighbor, current, direction)` that `pos` takes part in, in the
/// order west, north, east, south.
fn pairs_of(grid: &TileGrid, pos: GridPos) -> Vec<(GridPos, GridPos, Direction)> {
    let mut pairs = Vec::with_capacity(4);
    for dir in Direction::BOTH {
        if let Some(n) = grid.neighbor(pos, dir) {
            pairs.push((n, pos, dir));
        }
    }
    for dir in Direction::BOTH {
        if let Some(d) = grid.dependent(pos, dir) {
            pairs.push((pos, d, dir));
        }
    }
    pairs
}

fn correlate_pair(
    grid: &mut TileGrid,
    lifecycle: &mut LifecycleManager<'_>,
    (neighbor_pos, current_pos, dir): (GridPos, GridPos, Direction),
    degenerate: bool,
    provider: &dyn TransformProvider,
    scratch: &mut Scratch,
    config: &AlignmentConfig,
) -> Result<()> {
    let (neighbor, current) = grid.pair_mut(neighbor_pos, current_pos).ok_or_else(|| {
        StitchError::InvalidRegion(format!("no tile pair {neighbor_pos} / {current_pos}"))
    })?;

    let result = if degenerate {
        Ok(CorrelationEstimate::sentinel(0, 0))
    } else {
        phase_correlation_alignment(neighbor, current, dir, provider, scratch, config)
    };

    // Both reads happened even if the correlation failed.
    lifecycle.consume(neighbor);
    lifecycle.consume(current);

    let estimate = result?;
    match dir {
        Direction::West => debug!(
            "pciam_W(\"{}\",\"{}\"): {}",
            current.file_name, neighbor.file_name, estimate
        ),
        Direction::North => debug!(
            "pciam_N(\"{}\",\"{}\"): {}",
            neighbor.file_name, current.file_name, estimate
        ),
    }
    current.set_estimate(dir, estimate);
    Ok(())
}
