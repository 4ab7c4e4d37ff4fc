mod common;

use approx::assert_relative_eq;
use ndarray::Array2;
use proptest::prelude::*;

use tilestitch_core::consts::SENTINEL_SCORE;
use tilestitch_core::correlation::cross_correlation;
use tilestitch_core::search::{ccf_at, Orientation};
use tilestitch_core::view::WindowedView;

use common::texture;

#[test]
fn test_window_against_itself_is_one() {
    let data = texture(20, 30, 1);
    let v = WindowedView::new(&data, 3, 4, 10, 12);
    assert_relative_eq!(cross_correlation(&v, &v), 1.0, epsilon = 1e-9);
}

#[test]
fn test_correlation_is_symmetric() {
    let a = texture(16, 16, 2);
    let b = texture(16, 16, 3);
    let va = WindowedView::full(&a);
    let vb = WindowedView::full(&b);
    assert_relative_eq!(cross_correlation(&va, &vb), cross_correlation(&vb, &va), epsilon = 1e-12);
}

#[test]
fn test_gain_and_offset_do_not_change_score() {
    let a = texture(12, 12, 4);
    let b = a.mapv(|v| 3.0 * v + 0.25);
    let score = cross_correlation(&WindowedView::full(&a), &WindowedView::full(&b));
    assert_relative_eq!(score, 1.0, epsilon = 1e-6);
}

#[test]
fn test_ccf_matches_overlap_of_shifted_tiles() {
    let scene = texture(24, 40, 5);
    let west = scene.slice(ndarray::s![.., 0..24]).to_owned();
    let east = scene.slice(ndarray::s![.., 9..33]).to_owned();
    assert_relative_eq!(ccf_at(Orientation::LeftRight, &west, &east, 9, 0), 1.0, epsilon = 1e-9);
    assert!(ccf_at(Orientation::LeftRight, &west, &east, 8, 0) < 0.5);
}

proptest! {
    #[test]
    fn test_constant_window_is_sentinel(value in -10.0f32..10.0, h in 1usize..8, w in 1usize..8) {
        let flat = Array2::from_elem((h, w), value);
        let other = texture(h, w, 9);
        let score = cross_correlation(&WindowedView::full(&flat), &WindowedView::full(&other));
        prop_assert_eq!(score, SENTINEL_SCORE);
    }
}
