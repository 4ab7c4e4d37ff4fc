use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::consts::{
    DEFAULT_MAX_REPEATABILITY, DEFAULT_MIN_VALID_SCORE, DEFAULT_NUM_PEAKS, DEFAULT_REFINE_RADIUS,
};

/// Top-level stitching configuration, usually loaded from TOML.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StitchConfig {
    pub grid: GridConfig,
    #[serde(default)]
    pub traversal: TraversalOrder,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub alignment: AlignmentConfig,
    #[serde(default)]
    pub refinement: RefinementConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GridConfig {
    /// Directory holding the tile images.
    pub input_dir: PathBuf,
    /// Filename pattern with `{rr}` / `{cc}` placeholders, e.g. `img_r{rrr}_c{ccc}.tif`.
    pub pattern: String,
    pub rows: usize,
    pub cols: usize,
    /// Number of the first row/column in filenames (0 or 1).
    #[serde(default)]
    pub origin: usize,
    /// Restrict processing to part of the grid.
    #[serde(default)]
    pub region: Option<RegionConfig>,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("tiles"),
            pattern: "img_r{rrr}_c{ccc}.tif".to_string(),
            rows: 1,
            cols: 1,
            origin: 0,
            region: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionConfig {
    pub start_row: usize,
    pub start_col: usize,
    pub height: usize,
    pub width: usize,
}

/// Order in which the scheduler visits the sub-region.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraversalOrder {
    #[default]
    Row,
    Column,
    ChainedRow,
    ChainedColumn,
    Diagonal,
}

impl TraversalOrder {
    pub const ALL: [TraversalOrder; 5] = [
        Self::Row,
        Self::Column,
        Self::ChainedRow,
        Self::ChainedColumn,
        Self::Diagonal,
    ];
}

impl fmt::Display for TraversalOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Row => write!(f, "Row"),
            Self::Column => write!(f, "Column"),
            Self::ChainedRow => write!(f, "Chained Row"),
            Self::ChainedColumn => write!(f, "Chained Column"),
            Self::Diagonal => write!(f, "Diagonal"),
        }
    }
}

/// Which transform implementation computes the frequency-domain buffers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    /// Plain rustfft, one planner per call, single-threaded.
    Software,
    /// Cached FFT plans with Rayon-parallel row/column passes.
    #[default]
    Native,
    /// Like `Native`, but every transform lives in a slot of a fixed-size pool.
    Device,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Software => write!(f, "Software"),
            Self::Native => write!(f, "Native"),
            Self::Device => write!(f, "Device"),
        }
    }
}

/// What a pool checkout does when no slot is free.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExhaustionPolicy {
    /// Wait for a slot. `None` waits forever.
    Block { timeout_ms: Option<u64> },
    FailFast,
}

impl Default for ExhaustionPolicy {
    fn default() -> Self {
        Self::Block {
            timeout_ms: Some(30_000),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,
    /// Pool capacity for the device backend. Derived from the grid extent if unset.
    #[serde(default)]
    pub pool_capacity: Option<usize>,
    #[serde(default)]
    pub exhaustion: ExhaustionPolicy,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchStrategy {
    #[default]
    HillClimb,
    Exhaustive,
}

impl fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HillClimb => write!(f, "Hill Climbing"),
            Self::Exhaustive => write!(f, "Exhaustive"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AlignmentConfig {
    /// Number of correlation-surface maxima to disambiguate per pair.
    pub num_peaks: usize,
    /// Half-width of the refinement window around the coarse peak.
    pub refine_radius: i32,
    #[serde(default)]
    pub strategy: SearchStrategy,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            num_peaks: DEFAULT_NUM_PEAKS,
            refine_radius: DEFAULT_REFINE_RADIUS,
            strategy: SearchStrategy::HillClimb,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RefinementConfig {
    pub enabled: bool,
    /// Edges scoring below this are considered unreliable.
    pub min_score: f64,
    pub max_repeatability: i32,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_score: DEFAULT_MIN_VALID_SCORE,
            max_repeatability: DEFAULT_MAX_REPEATABILITY,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub prefix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            prefix: "img-".to_string(),
        }
    }
}

impl OutputConfig {
    pub fn global_positions_path(&self) -> PathBuf {
        self.directory
            .join(format!("{}global-positions.txt", self.prefix))
    }

    pub fn relative_positions_path(&self) -> PathBuf {
        self.directory
            .join(format!("{}relative-positions.txt", self.prefix))
    }

    pub fn relative_positions_pre_refinement_path(&self) -> PathBuf {
        self.directory
            .join(format!("{}relative-positions-no-optimization.txt", self.prefix))
    }
}
