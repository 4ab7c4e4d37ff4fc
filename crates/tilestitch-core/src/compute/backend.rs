use std::fmt;
use std::sync::Arc;

use ndarray::{Array2, ArrayView2};
use num_complex::Complex;

use crate::config::{BackendConfig, BackendKind};
use crate::consts::POOL_SLACK_SLOTS;
use crate::error::{Result, StitchError};

use super::cpu::{PlannedTransform, SoftwareTransform};
use super::device::PooledTransform;
use super::pool::PoolSlot;

/// Frequency-domain representation of one tile.
pub struct TransformBuffer {
    height: usize,
    width: usize,
    storage: Storage,
}

enum Storage {
    Owned(Array2<Complex<f64>>),
    /// Row-major `height * width` values held in a pool slot; returned to the
    /// pool when the buffer is dropped.
    Pooled(PoolSlot<Vec<Complex<f64>>>),
}

impl TransformBuffer {
    pub fn owned(data: Array2<Complex<f64>>) -> Self {
        let (height, width) = data.dim();
        Self {
            height,
            width,
            storage: Storage::Owned(data),
        }
    }

    pub(crate) fn pooled(slot: PoolSlot<Vec<Complex<f64>>>, height: usize, width: usize) -> Self {
        debug_assert!(slot.len() >= height * width);
        Self {
            height,
            width,
            storage: Storage::Pooled(slot),
        }
    }

    pub fn dim(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    pub fn is_pooled(&self) -> bool {
        matches!(self.storage, Storage::Pooled(_))
    }

    pub fn view(&self) -> ArrayView2<'_, Complex<f64>> {
        match &self.storage {
            Storage::Owned(data) => data.view(),
            Storage::Pooled(slot) => {
                ArrayView2::from_shape((self.height, self.width), &slot[..self.height * self.width])
                    .expect("pool slot holds height * width values")
            }
        }
    }
}

impl fmt::Debug for TransformBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformBuffer")
            .field("height", &self.height)
            .field("width", &self.width)
            .field("pooled", &self.is_pooled())
            .finish()
    }
}

/// Per-worker scratch memory reused across correlations.
#[derive(Debug)]
pub struct Scratch {
    pub(crate) cross: Array2<Complex<f64>>,
}

impl Scratch {
    pub fn new(height: usize, width: usize) -> Self {
        Self {
            cross: Array2::zeros((height, width)),
        }
    }

    pub fn dim(&self) -> (usize, usize) {
        self.cross.dim()
    }

    /// Resize if the tile shape changed.
    pub(crate) fn ensure_dim(&mut self, height: usize, width: usize) {
        if self.cross.dim() != (height, width) {
            self.cross = Array2::zeros((height, width));
        }
    }
}

/// Forward/inverse transform engine behind the phase correlation.
///
/// Implementations must be deterministic for identical inputs.
pub trait TransformProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Frequency-domain buffer of a tile's pixels.
    fn forward_transform(&self, pixels: &Array2<f32>, scratch: &mut Scratch)
        -> Result<TransformBuffer>;

    /// Up to `count` strongest maxima `(x, y)` of the phase correlation
    /// surface of `neighbor` against `current`, strongest first.
    fn inverse_transform_peaks(
        &self,
        neighbor: &TransformBuffer,
        current: &TransformBuffer,
        scratch: &mut Scratch,
        count: usize,
    ) -> Result<Vec<(usize, usize)>>;

    /// The single strongest maximum `(x, y)`.
    fn inverse_transform_peak(
        &self,
        neighbor: &TransformBuffer,
        current: &TransformBuffer,
        scratch: &mut Scratch,
    ) -> Result<(usize, usize)> {
        let peaks = self.inverse_transform_peaks(neighbor, current, scratch, 1)?;
        Ok(peaks.first().copied().unwrap_or((0, 0)))
    }

    fn new_scratch(&self, height: usize, width: usize) -> Scratch {
        Scratch::new(height, width)
    }
}

/// Build the configured transform provider. `region_diagonal` sizes the
/// device pool when no explicit capacity is given.
pub fn create_provider(
    config: &BackendConfig,
    region_diagonal: usize,
) -> Result<Arc<dyn TransformProvider>> {
    let provider: Arc<dyn TransformProvider> = match config.kind {
        BackendKind::Software => Arc::new(SoftwareTransform),
        BackendKind::Native => Arc::new(PlannedTransform::new()),
        BackendKind::Device => {
            let capacity = config
                .pool_capacity
                .unwrap_or(region_diagonal + POOL_SLACK_SLOTS);
            if capacity == 0 {
                return Err(StitchError::Config(
                    "device pool capacity must be at least 1".into(),
                ));
            }
            Arc::new(PooledTransform::with_host_memory(capacity, config.exhaustion))
        }
    };
    tracing::info!(backend = provider.name(), "Transform provider ready");
    Ok(provider)
}
