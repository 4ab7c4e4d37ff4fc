use crate::compute::{Scratch, TransformProvider};
use crate::error::Result;
use crate::io::PixelSource;
use crate::grid::TileGrid;
use crate::tile::Tile;

/// Counts of transform buffers created and destroyed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LifecycleStats {
    pub computed: usize,
    pub released: usize,
    pub live: usize,
    pub peak_live: usize,
}

/// Loads pixels and transforms on demand and frees them as soon as a tile's
/// pending-use counter reaches zero.
pub struct LifecycleManager<'a> {
    provider: &'a dyn TransformProvider,
    pixels: &'a dyn PixelSource,
    stats: LifecycleStats,
}

impl<'a> LifecycleManager<'a> {
    pub fn new(provider: &'a dyn TransformProvider, pixels: &'a dyn PixelSource) -> Self {
        Self {
            provider,
            pixels,
            stats: LifecycleStats::default(),
        }
    }

    pub fn stats(&self) -> LifecycleStats {
        self.stats
    }

    /// Read the tile's pixels and compute its transform.
    ///
    /// A tile nobody will correlate against is released straight away.
    pub fn acquire(&mut self, tile: &mut Tile, scratch: &mut Scratch) -> Result<()> {
        let pixels = self.pixels.read_tile(tile)?;
        let transform = self.provider.forward_transform(&pixels, scratch)?;
        tile.set_pixels(pixels);
        tile.set_transform(transform);

        self.stats.computed += 1;
        self.stats.live += 1;
        self.stats.peak_live = self.stats.peak_live.max(self.stats.live);

        self.release_if_unused(tile);
        Ok(())
    }

    /// Record one finished read of `tile`'s transform. Returns `true` if the
    /// buffer was released by this call.
    pub fn consume(&mut self, tile: &mut Tile) -> bool {
        if tile.pending_uses() > 0 {
            tile.decrement_pending_uses();
        }
        self.release_if_unused(tile)
    }

    /// Drop every remaining read and free all live transforms after a
    /// failed traversal. Returns the number of buffers released.
    pub fn abort(&mut self, grid: &mut TileGrid) -> usize {
        let mut released = 0;
        for tile in grid.tiles_mut() {
            tile.set_pending_uses(0);
            if self.release_if_unused(tile) {
                released += 1;
            }
        }
        released
    }

    fn release_if_unused(&mut self, tile: &mut Tile) -> bool {
        if !tile.release_if_unused() {
            return false;
        }
        self.stats.released += 1;
        self.stats.live -= 1;
        tracing::trace!(tile = %tile.pos, "Released transform");
        true
    }
}
