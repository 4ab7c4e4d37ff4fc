use std::cmp::Ordering;
use std::fmt;

use ndarray::Array2;

use crate::compute::TransformBuffer;
use crate::consts::SENTINEL_SCORE;
use crate::search::Orientation;

/// Grid coordinate of a tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridPos {
    pub row: usize,
    pub col: usize,
}

impl GridPos {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for GridPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// Which neighbour an estimate relates the tile to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    West,
    North,
}

impl Direction {
    pub const BOTH: [Direction; 2] = [Direction::West, Direction::North];

    /// West pairs overlap left-right, north pairs up-down.
    pub fn orientation(self) -> Orientation {
        match self {
            Self::West => Orientation::LeftRight,
            Self::North => Orientation::UpDown,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::West => "west",
            Self::North => "north",
        }
    }
}

/// Translation of a tile relative to its west or north neighbour.
///
/// `dx`/`dy` give the origin of the current tile in the neighbour's pixel
/// frame. Scores are ordered with [`CorrelationEstimate::cmp_score`]; the
/// sentinel `-1.0` is the worst value any search produces.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CorrelationEstimate {
    pub score: f64,
    pub dx: i32,
    pub dy: i32,
}

impl CorrelationEstimate {
    pub const fn new(score: f64, dx: i32, dy: i32) -> Self {
        Self { score, dx, dy }
    }

    pub const fn sentinel(dx: i32, dy: i32) -> Self {
        Self::new(SENTINEL_SCORE, dx, dy)
    }

    pub fn is_degenerate(&self) -> bool {
        !(self.score > SENTINEL_SCORE)
    }

    pub fn cmp_score(&self, other: &Self) -> Ordering {
        self.score.total_cmp(&other.score)
    }

    pub fn to_csv(&self) -> String {
        format!("{},{},{}", self.score, self.dx, self.dy)
    }
}

impl fmt::Display for CorrelationEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.score, self.dx, self.dy)
    }
}

/// One image of the mosaic and everything computed about it.
#[derive(Debug)]
pub struct Tile {
    pub pos: GridPos,
    pub file_name: String,
    pixels: Option<Array2<f32>>,
    transform: Option<TransformBuffer>,
    pending_uses: usize,
    pub west: Option<CorrelationEstimate>,
    pub north: Option<CorrelationEstimate>,
    pub pre_refinement_west: Option<CorrelationEstimate>,
    pub pre_refinement_north: Option<CorrelationEstimate>,
    pub abs_x: i64,
    pub abs_y: i64,
    pub correlation: f64,
}

impl Tile {
    pub fn new(pos: GridPos, file_name: impl Into<String>) -> Self {
        Self {
            pos,
            file_name: file_name.into(),
            pixels: None,
            transform: None,
            pending_uses: 0,
            west: None,
            north: None,
            pre_refinement_west: None,
            pre_refinement_north: None,
            abs_x: 0,
            abs_y: 0,
            correlation: 0.0,
        }
    }

    pub fn row(&self) -> usize {
        self.pos.row
    }

    pub fn col(&self) -> usize {
        self.pos.col
    }

    pub fn pixels(&self) -> Option<&Array2<f32>> {
        self.pixels.as_ref()
    }

    pub fn set_pixels(&mut self, data: Array2<f32>) {
        self.pixels = Some(data);
    }

    pub fn transform(&self) -> Option<&TransformBuffer> {
        self.transform.as_ref()
    }

    pub fn has_transform(&self) -> bool {
        self.transform.is_some()
    }

    pub(crate) fn set_transform(&mut self, buffer: TransformBuffer) {
        debug_assert!(self.transform.is_none(), "transform computed twice for {}", self.pos);
        self.transform = Some(buffer);
    }

    pub fn pending_uses(&self) -> usize {
        self.pending_uses
    }

    pub(crate) fn set_pending_uses(&mut self, uses: usize) {
        self.pending_uses = uses;
    }

    /// Consume one read of the transform. Returns the remaining count.
    pub(crate) fn decrement_pending_uses(&mut self) -> usize {
        debug_assert!(self.pending_uses > 0, "pending-use underflow on {}", self.pos);
        self.pending_uses = self.pending_uses.saturating_sub(1);
        self.pending_uses
    }

    /// Drop the transform and raw pixels once no reads remain.
    ///
    /// Returns `true` only on the call that actually released the buffer.
    pub(crate) fn release_if_unused(&mut self) -> bool {
        if self.pending_uses != 0 {
            return false;
        }
        self.pixels = None;
        self.transform.take().is_some()
    }

    pub fn estimate(&self, dir: Direction) -> Option<CorrelationEstimate> {
        match dir {
            Direction::West => self.west,
            Direction::North => self.north,
        }
    }

    pub fn set_estimate(&mut self, dir: Direction, estimate: CorrelationEstimate) {
        match dir {
            Direction::West => self.west = Some(estimate),
            Direction::North => self.north = Some(estimate),
        }
    }

    pub fn pre_refinement(&self, dir: Direction) -> Option<CorrelationEstimate> {
        match dir {
            Direction::West => self.pre_refinement_west,
            Direction::North => self.pre_refinement_north,
        }
    }

    pub fn backup_translations(&mut self) {
        self.pre_refinement_west = self.west;
        self.pre_refinement_north = self.north;
    }

    pub fn restore_translations(&mut self) {
        self.west = self.pre_refinement_west;
        self.north = self.pre_refinement_north;
    }
}
