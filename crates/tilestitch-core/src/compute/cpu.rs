use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use ndarray::parallel::prelude::*;
use ndarray::{Array2, ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2, Axis, Zip};
use num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::consts::{CROSS_POWER_EPSILON, PARALLEL_PIXEL_THRESHOLD};
use crate::error::{Result, StitchError};

use super::{Scratch, TransformBuffer, TransformProvider};

/// Pure-Rust provider that plans every call and runs single-threaded.
pub struct SoftwareTransform;

impl TransformProvider for SoftwareTransform {
    fn name(&self) -> &str {
        "software"
    }

    fn forward_transform(&self, pixels: &Array2<f32>, _scratch: &mut Scratch) -> Result<TransformBuffer> {
        let (h, w) = pixels.dim();
        let plan = FftPlan2d::new(&mut FftPlanner::new(), h, w);
        let mut out = Array2::zeros((h, w));
        plan.forward_into(pixels, out.view_mut(), false);
        Ok(TransformBuffer::owned(out))
    }

    fn inverse_transform_peaks(
        &self,
        neighbor: &TransformBuffer,
        current: &TransformBuffer,
        scratch: &mut Scratch,
        count: usize,
    ) -> Result<Vec<(usize, usize)>> {
        let (h, w) = check_same_dim(neighbor, current)?;
        let plan = FftPlan2d::new(&mut FftPlanner::new(), h, w);
        Ok(correlation_peaks(&plan, neighbor, current, scratch, count, false))
    }
}

/// Provider with cached plans and rayon-parallel row/column passes on
/// large tiles.
pub struct PlannedTransform {
    plans: PlanCache,
}

impl PlannedTransform {
    pub fn new() -> Self {
        Self {
            plans: PlanCache::default(),
        }
    }
}

impl Default for PlannedTransform {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformProvider for PlannedTransform {
    fn name(&self) -> &str {
        "native"
    }

    fn forward_transform(&self, pixels: &Array2<f32>, _scratch: &mut Scratch) -> Result<TransformBuffer> {
        let (h, w) = pixels.dim();
        let plan = self.plans.get(h, w);
        let mut out = Array2::zeros((h, w));
        plan.forward_into(pixels, out.view_mut(), use_parallel(h, w));
        Ok(TransformBuffer::owned(out))
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

// ---------------------------------------------------------------------------
// Plans
// ---------------------------------------------------------------------------

/// Row and column plans for one tile shape, both directions.
pub struct FftPlan2d {
    height: usize,
    width: usize,
    row_fwd: Arc<dyn Fft<f64>>,
    col_fwd: Arc<dyn Fft<f64>>,
    row_inv: Arc<dyn Fft<f64>>,
    col_inv: Arc<dyn Fft<f64>>,
}

impl FftPlan2d {
    pub fn new(planner: &mut FftPlanner<f64>, height: usize, width: usize) -> Self {
        Self {
            height,
            width,
            row_fwd: planner.plan_fft_forward(width),
            col_fwd: planner.plan_fft_forward(height),
            row_inv: planner.plan_fft_inverse(width),
            col_inv: planner.plan_fft_inverse(height),
        }
    }

    pub fn dim(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Forward transform of `data` written into `out` (same shape).
    pub fn forward_into(&self, data: &Array2<f32>, mut out: ArrayViewMut2<'_, Complex<f64>>, parallel: bool) {
        Zip::from(&mut out)
            .and(data)
            .for_each(|o, &v| *o = Complex::new(v as f64, 0.0));
        transform_lanes(&mut out, Axis(1), &self.row_fwd, parallel);
        transform_lanes(&mut out, Axis(0), &self.col_fwd, parallel);
    }

    /// Unnormalized inverse transform in place.
    pub fn inverse_in_place(&self, mut work: ArrayViewMut2<'_, Complex<f64>>, parallel: bool) {
        transform_lanes(&mut work, Axis(0), &self.col_inv, parallel);
        transform_lanes(&mut work, Axis(1), &self.row_inv, parallel);
    }
}

/// Plans keyed by tile shape, shared by every worker.
pub(crate) struct PlanCache {
    planner: Mutex<FftPlanner<f64>>,
    plans: Mutex<HashMap<(usize, usize), Arc<FftPlan2d>>>,
}

impl Default for PlanCache {
    fn default() -> Self {
        Self {
            planner: Mutex::new(FftPlanner::new()),
            plans: Mutex::new(HashMap::new()),
        }
    }
}

impl PlanCache {
    pub(crate) fn get(&self, height: usize, width: usize) -> Arc<FftPlan2d> {
        let mut plans = self.plans.lock().unwrap_or_else(PoisonError::into_inner);
        plans
            .entry((height, width))
            .or_insert_with(|| {
                let mut planner = self.planner.lock().unwrap_or_else(PoisonError::into_inner);
                Arc::new(FftPlan2d::new(&mut planner, height, width))
            })
            .clone()
    }
}

pub(crate) fn use_parallel(height: usize, width: usize) -> bool {
    height * width >= PARALLEL_PIXEL_THRESHOLD
}

// ---------------------------------------------------------------------------
// Shared FFT helpers
// ---------------------------------------------------------------------------

/// 1D transform of every lane along `lane_axis` (`Axis(1)` = rows).
fn transform_lanes(
    work: &mut ArrayViewMut2<'_, Complex<f64>>,
    lane_axis: Axis,
    fft: &Arc<dyn Fft<f64>>,
    parallel: bool,
) {
    // Lanes along axis 1 are rows, so iterate over axis 0 to get them.
    let outer = Axis(1 - lane_axis.index());
    if parallel {
        work.axis_iter_mut(outer)
            .into_par_iter()
            .for_each(|mut lane| process_lane(fft.as_ref(), &mut lane));
    } else {
        for mut lane in work.axis_iter_mut(outer) {
            process_lane(fft.as_ref(), &mut lane);
        }
    }
}

fn process_lane(fft: &dyn Fft<f64>, lane: &mut ArrayViewMut1<'_, Complex<f64>>) {
    if let Some(slice) = lane.as_slice_mut() {
        fft.process(slice);
        return;
    }
    let mut buf = lane.to_vec();
    fft.process(&mut buf);
    lane.assign(&ArrayView1::from(&buf[..]));
}

/// Normalized cross-power spectrum `conj(neighbor) * current / |..|` into
/// `out`. Bins below [`CROSS_POWER_EPSILON`] are zeroed.
pub fn cross_power_spectrum(
    neighbor: ArrayView2<'_, Complex<f64>>,
    current: ArrayView2<'_, Complex<f64>>,
    out: &mut Array2<Complex<f64>>,
    parallel: bool,
) {
    let normalize = |o: &mut Complex<f64>, a: &Complex<f64>, b: &Complex<f64>| {
        let cross = a.conj() * b;
        let mag = cross.norm();
        *o = if mag > CROSS_POWER_EPSILON {
            cross / mag
        } else {
            Complex::new(0.0, 0.0)
        };
    };
    let zip = Zip::from(out).and(&neighbor).and(&current);
    if parallel {
        zip.par_for_each(normalize);
    } else {
        zip.for_each(normalize);
    }
}

/// Up to `count` strongest real maxima as `(x, y)` = `(col, row)`, strongest
/// first. Equal values keep row-major order.
pub fn find_peaks(surface: ArrayView2<'_, Complex<f64>>, count: usize) -> Vec<(usize, usize)> {
    let count = count.max(1);
    let mut best: Vec<(f64, usize, usize)> = Vec::with_capacity(count + 1);
    for ((row, col), v) in surface.indexed_iter() {
        let val = v.re;
        if !val.is_finite() {
            continue;
        }
        if best.len() == count && best.last().is_some_and(|&(b, _, _)| val <= b) {
            continue;
        }
        let at = best
            .iter()
            .position(|&(b, _, _)| val > b)
            .unwrap_or(best.len());
        best.insert(at, (val, col, row));
        best.truncate(count);
    }
    best.into_iter().map(|(_, x, y)| (x, y)).collect()
}

pub(crate) fn check_same_dim(a: &TransformBuffer, b: &TransformBuffer) -> Result<(usize, usize)> {
    let (ah, aw) = a.dim();
    let (bh, bw) = b.dim();
    if (ah, aw) != (bh, bw) {
        return Err(StitchError::DimensionMismatch(ah, aw, bh, bw));
    }
    Ok((ah, aw))
}

/// Cross-power spectrum, inverse transform and peak pick, all in `scratch`.
pub(crate) fn correlation_peaks(
    plan: &FftPlan2d,
    neighbor: &TransformBuffer,
    current: &TransformBuffer,
    scratch: &mut Scratch,
    count: usize,
    parallel: bool,
) -> Vec<(usize, usize)> {
    let (h, w) = plan.dim();
    scratch.ensure_dim(h, w);
    cross_power_spectrum(neighbor.view(), current.view(), &mut scratch.cross, parallel);
    plan.inverse_in_place(scratch.cross.view_mut(), parallel);
    find_peaks(scratch.cross.view(), count)
}
