use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use tilestitch_core::io::positions::read_records;

use crate::summary;

#[derive(Args)]
pub struct PositionsArgs {
    /// Global positions file to validate
    pub file: PathBuf,

    /// Write the records back in canonical form to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn run(args: &PositionsArgs) -> Result<()> {
    let records = read_records(&args.file)
        .with_context(|| format!("Invalid positions file {}", args.file.display()))?;
    if records.is_empty() {
        bail!("{} holds no position records", args.file.display());
    }

    summary::print_positions_summary(&args.file, &records);

    if let Some(ref path) = args.output {
        let mut text = String::new();
        for record in &records {
            writeln!(text, "{record}")?;
        }
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Normalised positions saved to {}", path.display());
    }

    Ok(())
}
