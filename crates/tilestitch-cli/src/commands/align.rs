use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tilestitch_core::io::positions::write_relative_displacements;
use tilestitch_core::stitch::{ProgressReporter, Stage};

use super::{run_stitch, StitchArgs};
use crate::progress::BarReporter;
use crate::summary;

#[derive(Args)]
pub struct AlignArgs {
    #[command(flatten)]
    pub stitch: StitchArgs,
}

pub fn run(args: &AlignArgs) -> Result<()> {
    let mut config = args.stitch.load_config()?;
    config.refinement.enabled = false;

    let reporter = Arc::new(BarReporter::new());
    let (orchestrator, run) = run_stitch(&config, Arc::clone(&reporter))?;

    std::fs::create_dir_all(&config.output.directory).with_context(|| {
        format!("Failed to create {}", config.output.directory.display())
    })?;
    let relative = config.output.relative_positions_path();

    reporter.begin_stage(Stage::Writing, None);
    {
        let grid = orchestrator.grid();
        let grid = grid.lock().map_err(|_| anyhow::anyhow!("Tile grid lock poisoned"))?;
        write_relative_displacements(&grid, &relative)
            .with_context(|| format!("Failed to write {}", relative.display()))?;
    }
    reporter.finish_stage();

    summary::print_run_results(&run, &[relative]);
    Ok(())
}
