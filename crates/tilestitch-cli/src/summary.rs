use std::path::{Path, PathBuf};

use console::Style;
use tilestitch_core::config::{BackendKind, StitchConfig};
use tilestitch_core::consts::POOL_SLACK_SLOTS;
use tilestitch_core::grid::TileGrid;
use tilestitch_core::io::positions::PositionRecord;
use tilestitch_core::optimize::RunSummary;

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    path: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
        }
    }
}

fn underline(s: &Styles, title: &str) {
    println!("  {}", s.title.apply_to(title));
    println!(
        "  {}",
        s.title.apply_to("\u{2550}".repeat(title.chars().count()))
    );
    println!();
}

pub fn print_run_summary(config: &StitchConfig, grid: &TileGrid, backend_name: &str) {
    let s = Styles::new();

    println!();
    underline(&s, "Tile Stitching");

    println!(
        "  {:<14}{}",
        s.label.apply_to("Input"),
        s.path.apply_to(config.grid.input_dir.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Output"),
        s.path.apply_to(config.output.directory.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Backend"),
        s.method.apply_to(backend_name)
    );
    if config.backend.kind == BackendKind::Device {
        let capacity = config
            .backend
            .pool_capacity
            .unwrap_or_else(|| grid.region_diagonal() + POOL_SLACK_SLOTS);
        println!(
            "    {:<12}{}",
            s.label.apply_to("Pool"),
            s.value.apply_to(format!("{capacity} slots"))
        );
    }
    println!();

    println!("  {}", s.header.apply_to("Grid"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Pattern"),
        s.value.apply_to(&config.grid.pattern)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Size"),
        s.value.apply_to(format!("{} x {}", grid.rows(), grid.cols()))
    );
    let region = grid.region();
    if region.len() != grid.rows() * grid.cols() {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Region"),
            s.value.apply_to(format!(
                "{} x {} at ({}, {})",
                region.height, region.width, region.start_row, region.start_col
            ))
        );
    }
    println!(
        "    {:<12}{}",
        s.label.apply_to("Order"),
        s.method.apply_to(config.traversal)
    );
    println!();

    println!("  {}", s.header.apply_to("Alignment"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Peaks"),
        s.value.apply_to(config.alignment.num_peaks)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Search"),
        s.method.apply_to(config.alignment.strategy)
    );
    println!();

    if config.refinement.enabled {
        println!("  {}", s.header.apply_to("Refinement"));
        println!(
            "    {:<12}{}",
            s.label.apply_to("Min score"),
            s.value.apply_to(config.refinement.min_score)
        );
        println!(
            "    {:<12}{}",
            s.label.apply_to("Max repeat"),
            s.value.apply_to(format!("{} px", config.refinement.max_repeatability))
        );
    } else {
        println!(
            "  {:<14}{}",
            s.header.apply_to("Refinement"),
            s.disabled.apply_to("disabled")
        );
    }
    println!();
}

pub fn print_run_results(run: &RunSummary, outputs: &[PathBuf]) {
    let s = Styles::new();

    println!();
    if let Some(ref t) = run.traversal {
        println!("  {}", s.header.apply_to("Translations"));
        println!(
            "    {:<12}{}",
            s.label.apply_to("Tiles"),
            s.value.apply_to(t.tiles_visited)
        );
        println!(
            "    {:<12}{}",
            s.label.apply_to("Pairs"),
            s.value.apply_to(t.pairs_correlated)
        );
        println!(
            "    {:<12}{}",
            s.label.apply_to("Peak live"),
            s.value.apply_to(format!("{} transforms", t.peak_live_transforms))
        );
    }
    if let Some(ref r) = run.refinement {
        println!("  {}", s.header.apply_to("Refinement"));
        println!(
            "    {:<12}{}",
            s.label.apply_to("Refined"),
            s.value.apply_to(format!("{} / {} edges", r.edges_refined, r.edges_examined))
        );
        for (label, repeatability) in [("West", r.repeatability_west), ("North", r.repeatability_north)] {
            match repeatability {
                Some(px) => println!(
                    "    {:<12}{}",
                    s.label.apply_to(label),
                    s.value.apply_to(format!("\u{00b1}{px} px"))
                ),
                None => println!(
                    "    {:<12}{}",
                    s.label.apply_to(label),
                    s.disabled.apply_to("no reliable edges")
                ),
            }
        }
    }
    println!();

    for path in outputs {
        println!("  {} {}", s.label.apply_to("Saved"), s.path.apply_to(path.display()));
    }
}

pub fn print_positions_summary(path: &Path, records: &[PositionRecord]) {
    let s = Styles::new();

    let rows = records.iter().map(|r| r.grid.row + 1).max().unwrap_or(0);
    let cols = records.iter().map(|r| r.grid.col + 1).max().unwrap_or(0);
    let min_x = records.iter().map(|r| r.x).min().unwrap_or(0);
    let max_x = records.iter().map(|r| r.x).max().unwrap_or(0);
    let min_y = records.iter().map(|r| r.y).min().unwrap_or(0);
    let max_y = records.iter().map(|r| r.y).max().unwrap_or(0);
    let mean_corr = records.iter().map(|r| r.corr).sum::<f64>() / records.len().max(1) as f64;

    println!();
    underline(&s, "Global Positions");
    println!(
        "  {:<14}{}",
        s.label.apply_to("File"),
        s.path.apply_to(path.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Records"),
        s.value.apply_to(records.len())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Grid"),
        s.value.apply_to(format!("{rows} x {cols}"))
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Extent"),
        s.value.apply_to(format!("x {min_x}..{max_x}, y {min_y}..{max_y}"))
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Mean corr"),
        s.value.apply_to(format!("{mean_corr:.4}"))
    );
    println!();
}
