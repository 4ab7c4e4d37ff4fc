#![allow(dead_code)]

use ndarray::Array2;

use tilestitch_core::grid::TileGrid;
use tilestitch_core::io::MemorySource;
use tilestitch_core::tile::GridPos;

/// Deterministic high-frequency texture in `[0, 1]`.
pub fn texture(height: usize, width: usize, seed: u64) -> Array2<f32> {
    Array2::from_shape_fn((height, width), |(r, c)| {
        let mut h = (r as u64)
            .wrapping_mul(0x9E37_79B9_7F4A_7C15)
            ^ (c as u64).wrapping_mul(0xC2B2_AE3D_27D4_EB4F)
            ^ seed.wrapping_mul(0x1656_67B1_9E37_79F9);
        h ^= h >> 29;
        h = h.wrapping_mul(0xBF58_476D_1CE4_E5B9);
        h ^= h >> 32;
        (h % 1000) as f32 / 999.0
    })
}

pub fn tile_name(pos: GridPos) -> String {
    format!("tile_r{}_c{}.png", pos.row, pos.col)
}

/// Tiles cut from one scene so that tile `(r, c)` starts at
/// `(r * step_y, c * step_x)`. West estimates should be `(step_x, 0)`,
/// north estimates `(0, step_y)`.
pub fn shifted_grid(
    rows: usize,
    cols: usize,
    tile_h: usize,
    tile_w: usize,
    step_x: usize,
    step_y: usize,
) -> (TileGrid, MemorySource) {
    let scene = texture(
        (rows - 1) * step_y + tile_h,
        (cols - 1) * step_x + tile_w,
        7,
    );
    let grid = TileGrid::new(rows, cols, tile_name).unwrap();
    let mut source = MemorySource::new();
    for tile in grid.tiles() {
        let r0 = tile.row() * step_y;
        let c0 = tile.col() * step_x;
        let data = scene
            .slice(ndarray::s![r0..r0 + tile_h, c0..c0 + tile_w])
            .to_owned();
        source.insert(tile.file_name.clone(), data);
    }
    (grid, source)
}

/// Every tile the same constant value.
pub fn constant_grid(rows: usize, cols: usize, size: usize, value: f32) -> (TileGrid, MemorySource) {
    let grid = TileGrid::new(rows, cols, tile_name).unwrap();
    let mut source = MemorySource::new();
    for tile in grid.tiles() {
        source.insert(tile.file_name.clone(), Array2::from_elem((size, size), value));
    }
    (grid, source)
}
