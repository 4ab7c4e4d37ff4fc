use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use image::{ImageBuffer, Luma};
use ndarray::Array2;

use crate::error::{Result, StitchError};
use crate::tile::Tile;

/// Where tile pixels come from.
pub trait PixelSource: Send + Sync {
    /// Pixels of `tile`, normalised to `[0, 1]`. Fails with
    /// [`StitchError::MissingTile`] when the image does not exist.
    fn read_tile(&self, tile: &Tile) -> Result<Array2<f32>>;
}

/// Tiles stored as image files in one directory.
#[derive(Clone, Debug)]
pub struct ImageDirSource {
    dir: PathBuf,
}

impl ImageDirSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, tile: &Tile) -> PathBuf {
        self.dir.join(&tile.file_name)
    }
}

impl PixelSource for ImageDirSource {
    fn read_tile(&self, tile: &Tile) -> Result<Array2<f32>> {
        let path = self.path_of(tile);
        if !path.is_file() {
            return Err(StitchError::MissingTile { path });
        }
        tracing::trace!(path = %path.display(), "Reading tile");
        load_tile(&path)
    }
}

/// Load any image as 16-bit luma scaled to `[0, 1]`.
pub fn load_tile(path: &Path) -> Result<Array2<f32>> {
    let img = image::open(path)?;
    let gray = img.to_luma16();
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return Err(StitchError::InvalidDimensions {
            width: w as usize,
            height: h as usize,
        });
    }
    Ok(Array2::from_shape_fn((h as usize, w as usize), |(row, col)| {
        gray.get_pixel(col as u32, row as u32).0[0] as f32 / 65535.0
    }))
}

/// Save pixels as a 16-bit grayscale image; format follows the extension.
pub fn save_tile(data: &Array2<f32>, path: &Path) -> Result<()> {
    let (h, w) = data.dim();
    let pixels: Vec<u16> = data
        .iter()
        .map(|&v| (v.clamp(0.0, 1.0) * 65535.0).round() as u16)
        .collect();
    let img = ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(w as u32, h as u32, pixels)
        .expect("buffer size matches dimensions");
    img.save(path)?;
    Ok(())
}

/// Tiles held in memory, keyed by file name.
#[derive(Debug, Default)]
pub struct MemorySource {
    tiles: HashMap<String, Array2<f32>>,
    reads: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, data: Array2<f32>) {
        self.tiles.insert(name.into(), data);
    }

    pub fn with(mut self, name: impl Into<String>, data: Array2<f32>) -> Self {
        self.insert(name, data);
        self
    }

    pub fn remove(&mut self, name: &str) -> Option<Array2<f32>> {
        self.tiles.remove(name)
    }

    /// Successful reads so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }
}

impl PixelSource for MemorySource {
    fn read_tile(&self, tile: &Tile) -> Result<Array2<f32>> {
        let data = self
            .tiles
            .get(&tile.file_name)
            .cloned()
            .ok_or_else(|| StitchError::MissingTile {
                path: PathBuf::from(&tile.file_name),
            })?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::GridPos;

    #[test]
    fn save_then_load_keeps_16_bit_precision() {
        let dir = tempfile::tempdir().unwrap();
        let data = Array2::from_shape_fn((5, 7), |(r, c)| (r * 7 + c) as f32 / 34.0);
        save_tile(&data, &dir.path().join("t.png")).unwrap();

        let source = ImageDirSource::new(dir.path());
        let loaded = source
            .read_tile(&Tile::new(GridPos::new(0, 0), "t.png"))
            .unwrap();
        assert_eq!(loaded.dim(), (5, 7));
        for (a, b) in data.iter().zip(loaded.iter()) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn missing_file_is_reported_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let source = ImageDirSource::new(dir.path());
        let err = source
            .read_tile(&Tile::new(GridPos::new(0, 0), "absent.tif"))
            .unwrap_err();
        match err {
            StitchError::MissingTile { path } => assert!(path.ends_with("absent.tif")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn memory_source_counts_reads() {
        let source = MemorySource::new().with("a", Array2::zeros((2, 2)));
        let tile = Tile::new(GridPos::new(0, 0), "a");
        source.read_tile(&tile).unwrap();
        source.read_tile(&tile).unwrap();
        assert_eq!(source.reads(), 2);
        assert!(source
            .read_tile(&Tile::new(GridPos::new(0, 1), "b"))
            .unwrap_err()
            .is_missing_resource());
    }
}
