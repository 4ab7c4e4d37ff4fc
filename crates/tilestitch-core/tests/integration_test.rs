mod common;

use std::fs;
use std::sync::Arc;

use tilestitch_core::compute::create_provider;
use tilestitch_core::config::{BackendKind, StitchConfig, TraversalOrder};
use tilestitch_core::grid::TileGrid;
use tilestitch_core::io::pixels::save_tile;
use tilestitch_core::io::positions::{
    read_positions, write_positions, write_relative_displacements,
    write_relative_displacements_pre_refinement,
};
use tilestitch_core::io::ImageDirSource;
use tilestitch_core::optimize::{Orchestrator, RunOutcome};
use tilestitch_core::tile::GridPos;

use common::texture;

const ROWS: usize = 2;
const COLS: usize = 3;
const TILE: usize = 48;
const STEP_X: usize = 30;
const STEP_Y: usize = 34;

/// Cut a scene into PNG tiles named by `pattern` under `dir`.
fn write_tiles(dir: &std::path::Path, pattern: &str) {
    let scene = texture((ROWS - 1) * STEP_Y + TILE, (COLS - 1) * STEP_X + TILE, 11);
    let grid = TileGrid::from_pattern(pattern, ROWS, COLS, 1).unwrap();
    for tile in grid.tiles() {
        let r0 = tile.row() * STEP_Y;
        let c0 = tile.col() * STEP_X;
        let data = scene
            .slice(ndarray::s![r0..r0 + TILE, c0..c0 + TILE])
            .to_owned();
        save_tile(&data, &dir.join(&tile.file_name)).unwrap();
    }
}

#[test]
fn test_full_pipeline_from_image_directory() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    let pattern = "img_r{rr}_c{cc}.png";
    write_tiles(input.path(), pattern);

    let mut config = StitchConfig::default();
    config.grid.input_dir = input.path().to_path_buf();
    config.grid.pattern = pattern.to_string();
    config.grid.rows = ROWS;
    config.grid.cols = COLS;
    config.grid.origin = 1;
    config.traversal = TraversalOrder::ChainedRow;
    config.backend.kind = BackendKind::Device;
    config.output.directory = output.path().to_path_buf();

    let grid = TileGrid::from_config(&config.grid).unwrap();
    let provider = create_provider(&config.backend, grid.region_diagonal()).unwrap();
    let pixels = Arc::new(ImageDirSource::new(&config.grid.input_dir));
    let orch = Orchestrator::new(grid, config.clone(), provider, pixels);

    let summary = match orch.run() {
        RunOutcome::Completed(summary) => summary,
        other => panic!("pipeline did not complete: {other:?}"),
    };
    let traversal = summary.traversal.unwrap();
    assert_eq!(traversal.pairs_correlated, 7);
    assert_eq!(traversal.transforms_released, ROWS * COLS);

    let grid = orch.grid();
    let grid = grid.lock().unwrap();
    for tile in grid.tiles() {
        if let Some(w) = tile.west {
            assert_eq!((w.dx, w.dy), (STEP_X as i32, 0), "{}", tile.pos);
            assert!(w.score > 0.99);
        }
        if let Some(n) = tile.north {
            assert_eq!((n.dx, n.dy), (0, STEP_Y as i32), "{}", tile.pos);
            assert!(n.score > 0.99);
        }
    }

    let relative = config.output.relative_positions_path();
    let pre = config.output.relative_positions_pre_refinement_path();
    write_relative_displacements(&grid, &relative).unwrap();
    write_relative_displacements_pre_refinement(&grid, &pre).unwrap();

    let text = fs::read_to_string(&relative).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 7);
    assert!(lines[0].starts_with("west, img_r01_c02.png, img_r01_c01.png, "), "{}", lines[0]);
    assert!(lines[0].ends_with(",30,0"), "{}", lines[0]);
    assert!(lines.iter().any(|l| l.starts_with("north, img_r02_c03.png, img_r01_c03.png, ")));
    assert_eq!(fs::read_to_string(&pre).unwrap(), text);

    let global = config.output.global_positions_path();
    write_positions(&grid, &global).unwrap();
    assert!(global.ends_with("img-global-positions.txt"));
    let mut restored = TileGrid::from_config(&config.grid).unwrap();
    assert_eq!(read_positions(&mut restored, &global).unwrap(), ROWS * COLS);
    assert_eq!(
        restored.tile(GridPos::new(1, 2)).unwrap().file_name,
        "img_r02_c03.png"
    );
}

#[test]
fn test_missing_image_cancels_pipeline() {
    let input = tempfile::tempdir().unwrap();
    let pattern = "t_{r}_{c}.png";
    write_tiles(input.path(), pattern);
    fs::remove_file(input.path().join("t_2_2.png")).unwrap();

    let grid = TileGrid::from_pattern(pattern, ROWS, COLS, 1).unwrap();
    let config = StitchConfig::default();
    let provider = create_provider(&config.backend, grid.region_diagonal()).unwrap();
    let orch = Orchestrator::new(
        grid,
        config,
        provider,
        Arc::new(ImageDirSource::new(input.path())),
    );

    assert_eq!(orch.run(), RunOutcome::Cancelled);
    assert!(!orch.is_faulted());
}
