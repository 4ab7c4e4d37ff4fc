pub mod pixels;
pub mod positions;

pub use pixels::{ImageDirSource, MemorySource, PixelSource};
