use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::{RefinementConfig, SearchStrategy};
use crate::error::{Result, StitchError};
use crate::grid::TileGrid;
use crate::io::PixelSource;
use crate::search::{peak_search, SearchWindow};
use crate::tile::{CorrelationEstimate, Direction, GridPos};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RefineStats {
    pub edges_examined: usize,
    pub edges_refined: usize,
    pub repeatability_west: Option<i32>,
    pub repeatability_north: Option<i32>,
}

/// Post-alignment pass over the pairwise estimates.
pub trait RefinementStage: Send + Sync {
    fn name(&self) -> &str;

    /// Improve estimates in place. Must check `cancel` between units of
    /// work and return [`StitchError::Cancelled`] when it is set.
    fn refine(
        &self,
        grid: &mut TileGrid,
        pixels: &dyn PixelSource,
        cancel: &AtomicBool,
    ) -> Result<RefineStats>;
}

/// Per-direction stage model built from the reliable edges.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct StageModel {
    pub dx: i32,
    pub dy: i32,
    pub repeatability: i32,
}

/// Re-searches edges that disagree with the median stage motion.
///
/// Repeatability is half the spread of the off-axis displacement (`dy` for
/// west edges, `dx` for north edges) over edges scoring at least
/// `min_score`.
pub struct RepeatabilityRefinement {
    config: RefinementConfig,
}

impl RepeatabilityRefinement {
    pub fn new(config: RefinementConfig) -> Self {
        Self { config }
    }

    pub(crate) fn model(&self, estimates: &[CorrelationEstimate], dir: Direction) -> Option<StageModel> {
        let valid: Vec<&CorrelationEstimate> = estimates
            .iter()
            .filter(|e| e.score >= self.config.min_score)
            .collect();
        if valid.is_empty() {
            return None;
        }

        let mut dxs: Vec<i32> = valid.iter().map(|e| e.dx).collect();
        let mut dys: Vec<i32> = valid.iter().map(|e| e.dy).collect();
        dxs.sort_unstable();
        dys.sort_unstable();

        let off_axis = match dir {
            Direction::West => &dys,
            Direction::North => &dxs,
        };
        let spread = off_axis[off_axis.len() - 1] - off_axis[0];
        let repeatability = ((spread + 1) / 2).min(self.config.max_repeatability);

        Some(StageModel {
            dx: dxs[dxs.len() / 2],
            dy: dys[dys.len() / 2],
            repeatability,
        })
    }

    fn needs_refinement(&self, est: &CorrelationEstimate, model: &StageModel) -> bool {
        est.score < self.config.min_score
            || (est.dx - model.dx).abs() > model.repeatability
            || (est.dy - model.dy).abs() > model.repeatability
    }
}

impl Default for RepeatabilityRefinement {
    fn default() -> Self {
        Self::new(RefinementConfig::default())
    }
}

struct Job {
    current: GridPos,
    neighbor: GridPos,
    dir: Direction,
    window: SearchWindow,
    seed: (i32, i32),
}

impl RefinementStage for RepeatabilityRefinement {
    fn name(&self) -> &str {
        "repeatability"
    }

    fn refine(
        &self,
        grid: &mut TileGrid,
        pixels: &dyn PixelSource,
        cancel: &AtomicBool,
    ) -> Result<RefineStats> {
        let mut stats = RefineStats::default();
        let mut jobs = Vec::new();

        for dir in Direction::BOTH {
            let edges: Vec<(GridPos, GridPos, CorrelationEstimate)> = grid
                .region_tiles()
                .filter_map(|t| {
                    let neighbor = grid.neighbor(t.pos, dir)?;
                    Some((t.pos, neighbor, t.estimate(dir)?))
                })
                .collect();
            stats.edges_examined += edges.len();

            let estimates: Vec<CorrelationEstimate> = edges.iter().map(|e| e.2).collect();
            let Some(model) = self.model(&estimates, dir) else {
                if !edges.is_empty() {
                    warn!(direction = dir.label(), "No reliable edges, skipping refinement");
                }
                continue;
            };
            info!(
                direction = dir.label(),
                dx = model.dx,
                dy = model.dy,
                repeatability = model.repeatability,
                "Stage model"
            );
            match dir {
                Direction::West => stats.repeatability_west = Some(model.repeatability),
                Direction::North => stats.repeatability_north = Some(model.repeatability),
            }

            let r = model.repeatability;
            let window = match dir {
                Direction::West => {
                    SearchWindow::new(model.dx - 2 * r, model.dx + 2 * r, model.dy - r, model.dy + r)
                }
                Direction::North => {
                    SearchWindow::new(model.dx - r, model.dx + r, model.dy - 2 * r, model.dy + 2 * r)
                }
            };
            jobs.extend(
                edges
                    .into_iter()
                    .filter(|(_, _, est)| self.needs_refinement(est, &model))
                    .map(|(current, neighbor, _)| Job {
                        current,
                        neighbor,
                        dir,
                        window,
                        seed: (model.dx, model.dy),
                    }),
            );
        }

        let shared: &TileGrid = grid;
        let results: Vec<(GridPos, Direction, CorrelationEstimate)> = jobs
            .par_iter()
            .map(|job| {
                if cancel.load(Ordering::Relaxed) {
                    return Err(StitchError::Cancelled);
                }
                let (Some(current), Some(neighbor)) = (shared.tile(job.current), shared.tile(job.neighbor)) else {
                    return Err(StitchError::InvalidRegion(format!(
                        "no tile pair {} / {}",
                        job.neighbor, job.current
                    )));
                };
                let n_px = pixels.read_tile(neighbor)?;
                let c_px = pixels.read_tile(current)?;
                let est = peak_search(
                    job.window,
                    job.seed,
                    &n_px,
                    &c_px,
                    job.dir.orientation(),
                    SearchStrategy::HillClimb,
                );
                Ok((job.current, job.dir, est))
            })
            .collect::<Result<_>>()?;

        for (pos, dir, est) in results {
            if est.is_degenerate() {
                continue;
            }
            if let Some(tile) = grid.tile_mut(pos) {
                debug!(tile = %pos, direction = dir.label(), before = ?tile.estimate(dir), after = %est, "Refined edge");
                tile.set_estimate(dir, est);
                stats.edges_refined += 1;
            }
        }

        info!(
            examined = stats.edges_examined,
            refined = stats.edges_refined,
            "Refinement complete"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn est(score: f64, dx: i32, dy: i32) -> CorrelationEstimate {
        CorrelationEstimate::new(score, dx, dy)
    }

    #[test]
    fn model_uses_only_reliable_edges() {
        let stage = RepeatabilityRefinement::default();
        let edges = [
            est(0.9, 100, 2),
            est(0.8, 102, -1),
            est(0.95, 101, 0),
            est(0.1, 7, 40),
        ];
        let model = stage.model(&edges, Direction::West).unwrap();
        assert_eq!(model, StageModel { dx: 101, dy: 0, repeatability: 2 });
    }

    #[test]
    fn repeatability_is_capped() {
        let stage = RepeatabilityRefinement::new(RefinementConfig {
            max_repeatability: 3,
            ..RefinementConfig::default()
        });
        let edges = [est(0.9, -40, 100), est(0.9, 40, 100)];
        assert_eq!(stage.model(&edges, Direction::North).unwrap().repeatability, 3);
    }

    #[test]
    fn no_reliable_edges_means_no_model() {
        let stage = RepeatabilityRefinement::default();
        assert!(stage.model(&[est(0.2, 1, 1)], Direction::West).is_none());
        assert!(stage.model(&[], Direction::North).is_none());
    }

    #[test]
    fn outliers_are_flagged() {
        let stage = RepeatabilityRefinement::default();
        let model = StageModel { dx: 50, dy: 0, repeatability: 2 };
        assert!(!stage.needs_refinement(&est(0.9, 51, -2), &model));
        assert!(stage.needs_refinement(&est(0.9, 50, 3), &model));
        assert!(stage.needs_refinement(&est(0.3, 50, 0), &model));
    }
}
