use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tilestitch_core::io::positions::{
    write_relative_displacements, write_relative_displacements_pre_refinement,
};
use tilestitch_core::stitch::{ProgressReporter, Stage};

use super::{run_stitch, StitchArgs};
use crate::progress::BarReporter;
use crate::summary;

#[derive(Args)]
pub struct OptimizeArgs {
    #[command(flatten)]
    pub stitch: StitchArgs,

    /// Edges scoring below this are re-searched
    #[arg(long)]
    pub min_score: Option<f64>,

    /// Upper bound on the stage repeatability, in pixels
    #[arg(long)]
    pub max_repeatability: Option<i32>,
}

pub fn run(args: &OptimizeArgs) -> Result<()> {
    let mut config = args.stitch.load_config()?;
    config.refinement.enabled = true;
    if let Some(min_score) = args.min_score {
        config.refinement.min_score = min_score;
    }
    if let Some(max) = args.max_repeatability {
        config.refinement.max_repeatability = max;
    }

    let reporter = Arc::new(BarReporter::new());
    let (orchestrator, run) = run_stitch(&config, Arc::clone(&reporter))?;

    std::fs::create_dir_all(&config.output.directory).with_context(|| {
        format!("Failed to create {}", config.output.directory.display())
    })?;
    let outputs = [
        config.output.relative_positions_path(),
        config.output.relative_positions_pre_refinement_path(),
    ];

    reporter.begin_stage(Stage::Writing, Some(outputs.len()));
    {
        let grid = orchestrator.grid();
        let grid = grid.lock().map_err(|_| anyhow::anyhow!("Tile grid lock poisoned"))?;
        let context = |i: usize| format!("Failed to write {}", outputs[i].display());

        write_relative_displacements(&grid, &outputs[0]).with_context(|| context(0))?;
        reporter.advance(1);
        write_relative_displacements_pre_refinement(&grid, &outputs[1])
            .with_context(|| context(1))?;
        reporter.advance(2);
    }
    reporter.finish_stage();

    summary::print_run_results(&run, &outputs);
    Ok(())
}
