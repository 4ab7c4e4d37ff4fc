use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StitchError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image format error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Tile image not found: {}", path.display())]
    MissingTile { path: PathBuf },

    #[error("{} tile image(s) not found, first: {}", .0.len(), first_path(.0))]
    MissingTiles(Vec<PathBuf>),

    #[error("Malformed record on line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    #[error("Transform buffer pool exhausted (capacity {capacity})")]
    PoolExhausted { capacity: usize },

    #[error("Invalid grid region: {0}")]
    InvalidRegion(String),

    #[error("Invalid image dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Tile size mismatch: {0}x{1} vs {2}x{3}")]
    DimensionMismatch(usize, usize, usize, usize),

    #[error("Tile {tile} has no {what} loaded")]
    NotLoaded { tile: String, what: &'static str },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl StitchError {
    /// Missing input files are a soft failure for the optimizer.
    pub fn is_missing_resource(&self) -> bool {
        matches!(self, Self::MissingTile { .. } | Self::MissingTiles(_))
    }
}

fn first_path(paths: &[PathBuf]) -> String {
    paths
        .first()
        .map(|p| p.display().to_string())
        .unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, StitchError>;
