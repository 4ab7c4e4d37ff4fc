use std::sync::{Arc, Mutex, PoisonError};

use ndarray::{Array2, ArrayViewMut2};
use num_complex::Complex;

use crate::config::ExhaustionPolicy;
use crate::error::{Result, StitchError};

use super::cpu::{check_same_dim, correlation_peaks, use_parallel, PlanCache};
use super::pool::{BufferPool, DeviceAllocator, HostAllocator};
use super::{Scratch, TransformBuffer, TransformProvider};

type SpectrumPool = BufferPool<Vec<Complex<f64>>>;

/// Provider whose frequency-domain buffers live in a bounded slot pool.
///
/// The pool is created on the first forward transform, once the tile shape
/// is known. Every later tile must have the same shape.
pub struct PooledTransform {
    plans: PlanCache,
    allocator: Arc<dyn DeviceAllocator<Vec<Complex<f64>>>>,
    capacity: usize,
    policy: ExhaustionPolicy,
    pool: Mutex<Option<(usize, usize, Arc<SpectrumPool>)>>,
}

impl PooledTransform {
    pub fn new(
        allocator: Arc<dyn DeviceAllocator<Vec<Complex<f64>>>>,
        capacity: usize,
        policy: ExhaustionPolicy,
    ) -> Self {
        Self {
            plans: PlanCache::default(),
            allocator,
            capacity,
            policy,
            pool: Mutex::new(None),
        }
    }

    pub fn with_host_memory(capacity: usize, policy: ExhaustionPolicy) -> Self {
        Self::new(Arc::new(HostAllocator), capacity, policy)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The slot pool, if any tile has been transformed yet.
    pub fn pool(&self) -> Option<Arc<SpectrumPool>> {
        self.pool
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|(_, _, pool)| Arc::clone(pool))
    }

    fn pool_for(&self, height: usize, width: usize) -> Result<Arc<SpectrumPool>> {
        let mut guard = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some((h, w, pool)) if (*h, *w) == (height, width) => Ok(Arc::clone(pool)),
            Some((h, w, _)) => Err(StitchError::DimensionMismatch(*h, *w, height, width)),
            None => {
                tracing::debug!(
                    capacity = self.capacity,
                    height,
                    width,
                    "Allocating transform slot pool"
                );
                let pool = BufferPool::new(
                    Box::new(SharedAllocator(Arc::clone(&self.allocator))),
                    self.capacity,
                    height * width,
                    self.policy,
                );
                *guard = Some((height, width, Arc::clone(&pool)));
                Ok(pool)
            }
        }
    }
}

impl TransformProvider for PooledTransform {
    fn name(&self) -> &str {
        "device"
    }

    fn forward_transform(&self, pixels: &Array2<f32>, _scratch: &mut Scratch) -> Result<TransformBuffer> {
        let (h, w) = pixels.dim();
        let pool = self.pool_for(h, w)?;
        let mut slot = pool.checkout()?;
        let plan = self.plans.get(h, w);
        let out = ArrayViewMut2::from_shape((h, w), &mut slot[..h * w])
            .expect("pool slot holds height * width values");
        plan.forward_into(pixels, out, use_parallel(h, w));
        Ok(TransformBuffer::pooled(slot, h, w))
    }

    fn inverse_transform_peaks(
        &self,
        neighbor: &TransformBuffer,
        current: &TransformBuffer,
        scratch: &mut Scratch,
        count: usize,
    ) -> Result<Vec<(usize, usize)>> {
        let (h, w) = check_same_dim(neighbor, current)?;
        let plan = self.plans.get(h, w);
        Ok(correlation_peaks(&plan, neighbor, current, scratch, count, use_parallel(h, w)))
    }
}

struct SharedAllocator(Arc<dyn DeviceAllocator<Vec<Complex<f64>>>>);

impl DeviceAllocator<Vec<Complex<f64>>> for SharedAllocator {
    fn allocate(&self, slot_len: usize) -> Result<Vec<Complex<f64>>> {
        self.0.allocate(slot_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropping_buffers_returns_slots() {
        let provider = PooledTransform::with_host_memory(2, ExhaustionPolicy::FailFast);
        let mut scratch = provider.new_scratch(4, 4);
        let tile = Array2::from_shape_fn((4, 4), |(r, c)| (r * 4 + c) as f32);

        let a = provider.forward_transform(&tile, &mut scratch).unwrap();
        let b = provider.forward_transform(&tile, &mut scratch).unwrap();
        assert!(a.is_pooled());
        assert!(matches!(
            provider.forward_transform(&tile, &mut scratch),
            Err(StitchError::PoolExhausted { capacity: 2 })
        ));

        drop(a);
        drop(b);
        let pool = provider.pool().unwrap();
        assert_eq!(pool.in_use(), 0);
        assert!(provider.forward_transform(&tile, &mut scratch).is_ok());
    }

    #[test]
    fn later_tiles_must_match_first_shape() {
        let provider = PooledTransform::with_host_memory(4, ExhaustionPolicy::FailFast);
        let mut scratch = provider.new_scratch(4, 4);
        let _a = provider
            .forward_transform(&Array2::zeros((4, 4)), &mut scratch)
            .unwrap();
        assert!(matches!(
            provider.forward_transform(&Array2::zeros((4, 6)), &mut scratch),
            Err(StitchError::DimensionMismatch(4, 4, 4, 6))
        ));
    }
}
