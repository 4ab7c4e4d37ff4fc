pub mod traversal;

use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::config::{GridConfig, RegionConfig};
use crate::error::{Result, StitchError};
use crate::tile::{Direction, GridPos, Tile};

pub use traversal::Traversal;

/// Rectangular part of the grid that is actually processed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubRegion {
    pub start_row: usize,
    pub start_col: usize,
    pub height: usize,
    pub width: usize,
}

impl SubRegion {
    pub fn full(rows: usize, cols: usize) -> Self {
        Self {
            start_row: 0,
            start_col: 0,
            height: rows,
            width: cols,
        }
    }

    pub fn end_row(&self) -> usize {
        self.start_row + self.height
    }

    pub fn end_col(&self) -> usize {
        self.start_col + self.width
    }

    pub fn len(&self) -> usize {
        self.height * self.width
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, pos: GridPos) -> bool {
        (self.start_row..self.end_row()).contains(&pos.row)
            && (self.start_col..self.end_col()).contains(&pos.col)
    }

    /// Region coordinates in row-major order.
    pub fn positions(&self) -> impl Iterator<Item = GridPos> + '_ {
        (self.start_row..self.end_row())
            .flat_map(move |r| (self.start_col..self.end_col()).map(move |c| GridPos::new(r, c)))
    }
}

impl From<RegionConfig> for SubRegion {
    fn from(r: RegionConfig) -> Self {
        Self {
            start_row: r.start_row,
            start_col: r.start_col,
            height: r.height,
            width: r.width,
        }
    }
}

/// Row-major collection of tiles with a processing sub-region.
#[derive(Debug)]
pub struct TileGrid {
    rows: usize,
    cols: usize,
    tiles: Vec<Tile>,
    region: SubRegion,
}

impl TileGrid {
    /// Build a grid, naming each tile with `name_of`.
    pub fn new<F>(rows: usize, cols: usize, mut name_of: F) -> Result<Self>
    where
        F: FnMut(GridPos) -> String,
    {
        if rows == 0 || cols == 0 {
            return Err(StitchError::InvalidRegion(format!(
                "grid must have at least one tile, got {rows}x{cols}"
            )));
        }
        let tiles = (0..rows)
            .flat_map(|r| (0..cols).map(move |c| GridPos::new(r, c)))
            .map(|pos| Tile::new(pos, name_of(pos)))
            .collect();
        Ok(Self {
            rows,
            cols,
            tiles,
            region: SubRegion::full(rows, cols),
        })
    }

    /// Build a grid whose filenames come from a `{rrr}`/`{ccc}` pattern.
    pub fn from_pattern(pattern: &str, rows: usize, cols: usize, origin: usize) -> Result<Self> {
        if !placeholder_regex().is_match(pattern) {
            return Err(StitchError::Config(format!(
                "filename pattern {pattern:?} has no {{r}} or {{c}} placeholder"
            )));
        }
        Self::new(rows, cols, |pos| format_tile_name(pattern, pos, origin))
    }

    pub fn from_config(config: &GridConfig) -> Result<Self> {
        let grid = Self::from_pattern(&config.pattern, config.rows, config.cols, config.origin)?;
        match config.region {
            Some(region) => grid.with_region(region.into()),
            None => Ok(grid),
        }
    }

    /// Restrict processing to `region`, which must lie inside the grid.
    pub fn with_region(mut self, region: SubRegion) -> Result<Self> {
        if region.is_empty() || region.end_row() > self.rows || region.end_col() > self.cols {
            return Err(StitchError::InvalidRegion(format!(
                "region {}x{} at ({}, {}) does not fit a {}x{} grid",
                region.height, region.width, region.start_row, region.start_col, self.rows, self.cols
            )));
        }
        self.region = region;
        Ok(self)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn region(&self) -> SubRegion {
        self.region
    }

    fn index(&self, pos: GridPos) -> Option<usize> {
        (pos.row < self.rows && pos.col < self.cols).then(|| pos.row * self.cols + pos.col)
    }

    pub fn tile(&self, pos: GridPos) -> Option<&Tile> {
        self.index(pos).map(|i| &self.tiles[i])
    }

    pub fn tile_mut(&mut self, pos: GridPos) -> Option<&mut Tile> {
        let i = self.index(pos)?;
        Some(&mut self.tiles[i])
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn tiles_mut(&mut self) -> &mut [Tile] {
        &mut self.tiles
    }

    /// Tiles of the sub-region in row-major order.
    pub fn region_tiles(&self) -> impl Iterator<Item = &Tile> + '_ {
        self.region
            .positions()
            .filter_map(move |pos| self.tile(pos))
    }

    /// Two distinct tiles mutably at once.
    pub fn pair_mut(&mut self, a: GridPos, b: GridPos) -> Option<(&mut Tile, &mut Tile)> {
        let ia = self.index(a)?;
        let ib = self.index(b)?;
        if ia == ib {
            return None;
        }
        if ia < ib {
            let (lo, hi) = self.tiles.split_at_mut(ib);
            Some((&mut lo[ia], &mut hi[0]))
        } else {
            let (lo, hi) = self.tiles.split_at_mut(ia);
            Some((&mut hi[0], &mut lo[ib]))
        }
    }

    /// West or north neighbour of `pos`, if it is inside the sub-region.
    pub fn neighbor(&self, pos: GridPos, dir: Direction) -> Option<GridPos> {
        let n = match dir {
            Direction::West => GridPos::new(pos.row, pos.col.checked_sub(1)?),
            Direction::North => GridPos::new(pos.row.checked_sub(1)?, pos.col),
        };
        (self.region.contains(pos) && self.region.contains(n)).then_some(n)
    }

    /// East or south neighbour of `pos` inside the sub-region, i.e. the tile
    /// for which `pos` is the west/north neighbour.
    pub fn dependent(&self, pos: GridPos, dir: Direction) -> Option<GridPos> {
        let d = match dir {
            Direction::West => GridPos::new(pos.row, pos.col + 1),
            Direction::North => GridPos::new(pos.row + 1, pos.col),
        };
        (self.region.contains(pos) && self.region.contains(d)).then_some(d)
    }

    /// Number of correlations that will read the transform of `pos`.
    ///
    /// One self-use per west/north neighbour plus one neighbour-use per
    /// east/south dependent, all restricted to the sub-region.
    pub fn expected_uses(&self, pos: GridPos) -> usize {
        if !self.region.contains(pos) {
            return 0;
        }
        Direction::BOTH
            .iter()
            .map(|&dir| {
                usize::from(self.neighbor(pos, dir).is_some())
                    + usize::from(self.dependent(pos, dir).is_some())
            })
            .sum()
    }

    /// Reset every tile's pending-use counter from grid adjacency.
    pub fn init_pending_uses(&mut self) {
        let uses: Vec<usize> = (0..self.tiles.len())
            .map(|i| self.expected_uses(self.tiles[i].pos))
            .collect();
        for (tile, n) in self.tiles.iter_mut().zip(uses) {
            tile.set_pending_uses(n);
        }
    }

    /// Copy current estimates into the pre-refinement backups.
    pub fn backup_translations(&mut self) {
        self.tiles.iter_mut().for_each(Tile::backup_translations);
    }

    pub fn restore_translations(&mut self) {
        self.tiles.iter_mut().for_each(Tile::restore_translations);
    }

    /// Diagonal length of the sub-region in tiles, rounded up.
    pub fn region_diagonal(&self) -> usize {
        let h = self.region.height as f64;
        let w = self.region.width as f64;
        (h * h + w * w).sqrt().ceil() as usize
    }
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{(r+|c+)\}").expect("valid placeholder regex"))
}

/// Expand `{rr..}`/`{cc..}` placeholders, zero padding to the placeholder width.
pub fn format_tile_name(pattern: &str, pos: GridPos, origin: usize) -> String {
    placeholder_regex()
        .replace_all(pattern, |caps: &Captures| {
            let spec = &caps[1];
            let value = if spec.starts_with('r') {
                pos.row + origin
            } else {
                pos.col + origin
            };
            format!("{:0width$}", value, width = spec.len())
        })
        .into_owned()
}
