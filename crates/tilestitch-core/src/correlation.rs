use ndarray::Zip;

use crate::consts::{SENTINEL_SCORE, ZERO_VARIANCE_ULPS};
use crate::view::WindowedView;

/// Normalized cross-correlation of two equally shaped windows.
///
/// Sums are accumulated in `f64`. Empty or zero-variance windows have no
/// defined score and return [`SENTINEL_SCORE`].
pub fn cross_correlation(a: &WindowedView<'_>, b: &WindowedView<'_>) -> f64 {
    debug_assert_eq!(
        (a.height(), a.width()),
        (b.height(), b.width()),
        "correlation windows differ in shape"
    );

    let mut sum_ab = 0.0f64;
    let mut sum_a = 0.0f64;
    let mut sum_b = 0.0f64;
    let mut sq_a = 0.0f64;
    let mut sq_b = 0.0f64;

    Zip::from(a.as_array())
        .and(b.as_array())
        .for_each(|&pa, &pb| {
            let va = pa as f64;
            let vb = pb as f64;
            sum_ab += va * vb;
            sum_a += va;
            sum_b += vb;
            sq_a += va * va;
            sq_b += vb * vb;
        });

    let n = a.len() as f64;
    let var_a = sq_a - sum_a * sum_a / n;
    let var_b = sq_b - sum_b * sum_b / n;
    // Rounding can leave a constant window with a tiny nonzero variance.
    let tolerance = ZERO_VARIANCE_ULPS * n * f64::EPSILON;
    if var_a <= sq_a * tolerance || var_b <= sq_b * tolerance {
        return SENTINEL_SCORE;
    }
    let score = (sum_ab - sum_a * sum_b / n) / (var_a * var_b).sqrt();

    if score.is_finite() {
        score
    } else {
        SENTINEL_SCORE
    }
}
