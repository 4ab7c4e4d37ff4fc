mod commands;
mod progress;
mod summary;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tilestitch", about = "Pairwise translation estimation for microscopy tile grids")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute pairwise translations between adjacent tiles
    Align(commands::align::AlignArgs),
    /// Compute translations, then refine them against the stage model
    Optimize(commands::optimize::OptimizeArgs),
    /// Validate and normalise a global positions file
    Positions(commands::positions::PositionsArgs),
    /// Print a default configuration file
    Config(commands::config::ConfigArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Align(args) => commands::align::run(args),
        Commands::Optimize(args) => commands::optimize::run(args),
        Commands::Positions(args) => commands::positions::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}
