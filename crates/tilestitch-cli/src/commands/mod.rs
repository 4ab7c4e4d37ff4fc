pub mod align;
pub mod config;
pub mod optimize;
pub mod positions;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, ValueEnum};
use tilestitch_core::compute::create_provider;
use tilestitch_core::config::{BackendKind, StitchConfig, TraversalOrder};
use tilestitch_core::grid::TileGrid;
use tilestitch_core::io::ImageDirSource;
use tilestitch_core::optimize::{Orchestrator, RunOutcome, RunSummary};

use crate::progress::BarReporter;
use crate::summary;

#[derive(Clone, Copy, ValueEnum)]
pub enum OrderArg {
    Row,
    Column,
    ChainedRow,
    ChainedColumn,
    Diagonal,
}

impl From<OrderArg> for TraversalOrder {
    fn from(arg: OrderArg) -> Self {
        match arg {
            OrderArg::Row => Self::Row,
            OrderArg::Column => Self::Column,
            OrderArg::ChainedRow => Self::ChainedRow,
            OrderArg::ChainedColumn => Self::ChainedColumn,
            OrderArg::Diagonal => Self::Diagonal,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum BackendArg {
    Software,
    Native,
    Device,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Software => Self::Software,
            BackendArg::Native => Self::Native,
            BackendArg::Device => Self::Device,
        }
    }
}

/// Grid, backend and output options shared by `align` and `optimize`.
/// Flags override values loaded from `--config`.
#[derive(Args)]
pub struct StitchArgs {
    /// Stitching config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Directory holding the tile images
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Filename pattern with {rr}/{cc} placeholders, e.g. img_r{rrr}_c{ccc}.tif
    #[arg(long)]
    pub pattern: Option<String>,

    /// Number of grid rows
    #[arg(long)]
    pub rows: Option<usize>,

    /// Number of grid columns
    #[arg(long)]
    pub cols: Option<usize>,

    /// Number of the first row/column in filenames
    #[arg(long)]
    pub origin: Option<usize>,

    /// Tile visiting order
    #[arg(long, value_enum)]
    pub order: Option<OrderArg>,

    /// Transform backend
    #[arg(long, value_enum)]
    pub backend: Option<BackendArg>,

    /// Pool slots for the device backend
    #[arg(long)]
    pub pool_capacity: Option<usize>,

    /// Output directory
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Prefix for output filenames
    #[arg(long)]
    pub prefix: Option<String>,
}

impl StitchArgs {
    pub fn load_config(&self) -> Result<StitchConfig> {
        let mut config: StitchConfig = if let Some(ref path) = self.config {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            toml::from_str(&contents).context("Invalid stitch config")?
        } else {
            StitchConfig::default()
        };

        if let Some(ref input) = self.input {
            config.grid.input_dir = input.clone();
        }
        if let Some(ref pattern) = self.pattern {
            config.grid.pattern = pattern.clone();
        }
        if let Some(rows) = self.rows {
            config.grid.rows = rows;
        }
        if let Some(cols) = self.cols {
            config.grid.cols = cols;
        }
        if let Some(origin) = self.origin {
            config.grid.origin = origin;
        }
        if let Some(order) = self.order {
            config.traversal = order.into();
        }
        if let Some(backend) = self.backend {
            config.backend.kind = backend.into();
        }
        if self.pool_capacity.is_some() {
            config.backend.pool_capacity = self.pool_capacity;
        }
        if let Some(ref output) = self.output {
            config.output.directory = output.clone();
        }
        if let Some(ref prefix) = self.prefix {
            config.output.prefix = prefix.clone();
        }
        Ok(config)
    }
}

/// Build the grid and backend from `config` and run the orchestrator to
/// completion on the calling thread.
pub fn run_stitch(
    config: &StitchConfig,
    reporter: Arc<BarReporter>,
) -> Result<(Orchestrator, RunSummary)> {
    let grid = TileGrid::from_config(&config.grid).context("Invalid grid")?;
    let provider = create_provider(&config.backend, grid.region_diagonal())?;
    summary::print_run_summary(config, &grid, provider.name());

    let pixels = Arc::new(ImageDirSource::new(&config.grid.input_dir));
    let orchestrator =
        Orchestrator::new(grid, config.clone(), provider, pixels).with_reporter(reporter);

    match orchestrator.run() {
        RunOutcome::Completed(run) => Ok((orchestrator, run)),
        RunOutcome::Cancelled => {
            bail!(
                "Stitching cancelled: tile images missing from {}",
                config.grid.input_dir.display()
            )
        }
        RunOutcome::Faulted(fault) => bail!("Stitching failed: {fault}"),
    }
}
