use ndarray::{s, Array2, ArrayView2};

/// Zero-copy rectangular window into a tile's pixel buffer.
///
/// Bounds are not validated beyond what ndarray slicing enforces; callers
/// are expected to build windows that fit.
#[derive(Clone, Copy, Debug)]
pub struct WindowedView<'a> {
    data: ArrayView2<'a, f32>,
    origin_row: usize,
    origin_col: usize,
}

impl<'a> WindowedView<'a> {
    pub fn new(
        source: &'a Array2<f32>,
        origin_row: usize,
        origin_col: usize,
        height: usize,
        width: usize,
    ) -> Self {
        let data = source.slice(s![
            origin_row..origin_row + height,
            origin_col..origin_col + width
        ]);
        Self {
            data,
            origin_row,
            origin_col,
        }
    }

    /// The whole buffer as a window.
    pub fn full(source: &'a Array2<f32>) -> Self {
        let (h, w) = source.dim();
        Self::new(source, 0, 0, h, w)
    }

    pub fn origin(&self) -> (usize, usize) {
        (self.origin_row, self.origin_col)
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Pixel at window-relative coordinates.
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[[row, col]]
    }

    pub fn as_array(&self) -> ArrayView2<'a, f32> {
        self.data
    }
}
