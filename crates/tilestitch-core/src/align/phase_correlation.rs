use ndarray::Array2;

use crate::compute::{Scratch, TransformBuffer, TransformProvider};
use crate::config::AlignmentConfig;
use crate::error::{Result, StitchError};
use crate::search::{disambiguate_peak, peak_search, Orientation, SearchWindow};
use crate::tile::{CorrelationEstimate, Direction, Tile};

/// Displacement of `current` relative to its west or north `neighbor`.
///
/// Both tiles must have pixels and a transform loaded.
pub fn phase_correlation_alignment(
    neighbor: &Tile,
    current: &Tile,
    direction: Direction,
    provider: &dyn TransformProvider,
    scratch: &mut Scratch,
    config: &AlignmentConfig,
) -> Result<CorrelationEstimate> {
    let (n_px, n_fft) = loaded(neighbor)?;
    let (c_px, c_fft) = loaded(current)?;
    align_arrays(
        (n_px, n_fft),
        (c_px, c_fft),
        direction.orientation(),
        provider,
        scratch,
        config,
    )
}

/// Same as [`phase_correlation_alignment`] on raw buffers.
pub fn align_arrays(
    neighbor: (&Array2<f32>, &TransformBuffer),
    current: (&Array2<f32>, &TransformBuffer),
    orientation: Orientation,
    provider: &dyn TransformProvider,
    scratch: &mut Scratch,
    config: &AlignmentConfig,
) -> Result<CorrelationEstimate> {
    let (n_px, n_fft) = neighbor;
    let (c_px, c_fft) = current;
    let (h, w) = n_px.dim();
    let (ch, cw) = c_px.dim();
    if (h, w) != (ch, cw) {
        return Err(StitchError::DimensionMismatch(h, w, ch, cw));
    }

    let peaks = provider.inverse_transform_peaks(n_fft, c_fft, scratch, config.num_peaks)?;

    let mut best: Option<CorrelationEstimate> = None;
    for (x, y) in peaks {
        let candidate = disambiguate_peak(orientation, n_px, c_px, x, y);
        if best.map_or(true, |b| candidate.score > b.score) {
            best = Some(candidate);
        }
    }

    let candidate = match best {
        Some(c) if !c.is_degenerate() => c,
        _ => return Ok(CorrelationEstimate::sentinel(0, 0)),
    };

    let window = SearchWindow::around(candidate.dx, candidate.dy, config.refine_radius);
    let refined = peak_search(
        window,
        (candidate.dx, candidate.dy),
        n_px,
        c_px,
        orientation,
        config.strategy,
    );

    if refined.score >= candidate.score {
        Ok(refined)
    } else {
        Ok(candidate)
    }
}

fn loaded(tile: &Tile) -> Result<(&Array2<f32>, &TransformBuffer)> {
    let pixels = tile.pixels().ok_or_else(|| StitchError::NotLoaded {
        tile: tile.file_name.clone(),
        what: "pixels",
    })?;
    let transform = tile.transform().ok_or_else(|| StitchError::NotLoaded {
        tile: tile.file_name.clone(),
        what: "transform",
    })?;
    Ok((pixels, transform))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::cpu::SoftwareTransform;
    use crate::config::SearchStrategy;

    fn texture(h: usize, w: usize) -> Array2<f32> {
        Array2::from_shape_fn((h, w), |(r, c)| {
            let v = ((r * 131 + c * 71) ^ (r * c)) % 97;
            v as f32 / 97.0
        })
    }

    fn run(n: &Array2<f32>, c: &Array2<f32>, orientation: Orientation, strategy: SearchStrategy) -> CorrelationEstimate {
        let provider = SoftwareTransform;
        let (h, w) = n.dim();
        let mut scratch = provider.new_scratch(h, w);
        let nf = provider.forward_transform(n, &mut scratch).unwrap();
        let cf = provider.forward_transform(c, &mut scratch).unwrap();
        let config = AlignmentConfig {
            strategy,
            ..AlignmentConfig::default()
        };
        align_arrays((n, &nf), (c, &cf), orientation, &provider, &mut scratch, &config).unwrap()
    }

    #[test]
    fn recovers_horizontal_overlap() {
        let scene = texture(32, 60);
        let west = scene.slice(ndarray::s![.., 0..40]).to_owned();
        let east = scene.slice(ndarray::s![.., 12..52]).to_owned();
        for strategy in [SearchStrategy::HillClimb, SearchStrategy::Exhaustive] {
            let est = run(&west, &east, Orientation::LeftRight, strategy);
            assert_eq!((est.dx, est.dy), (12, 0), "{strategy}");
            assert!(est.score > 0.99, "score={}", est.score);
        }
    }

    #[test]
    fn recovers_vertical_overlap_with_lateral_offset() {
        let scene = texture(70, 50);
        let north = scene.slice(ndarray::s![0..40, 3..43]).to_owned();
        let south = scene.slice(ndarray::s![25..65, 0..40]).to_owned();
        let est = run(&north, &south, Orientation::UpDown, SearchStrategy::HillClimb);
        assert_eq!((est.dx, est.dy), (-3, 25));
        assert!(est.score > 0.99, "score={}", est.score);
    }

    #[test]
    fn constant_tiles_give_sentinel_at_origin() {
        let flat = Array2::from_elem((16, 16), 0.5f32);
        let est = run(&flat, &flat, Orientation::LeftRight, SearchStrategy::HillClimb);
        assert_eq!(est, CorrelationEstimate::sentinel(0, 0));
    }

    #[test]
    fn unloaded_tile_is_an_error() {
        let provider = SoftwareTransform;
        let mut scratch = provider.new_scratch(4, 4);
        let a = Tile::new(crate::tile::GridPos::new(0, 0), "a.tif");
        let b = Tile::new(crate::tile::GridPos::new(0, 1), "b.tif");
        let err = phase_correlation_alignment(
            &a,
            &b,
            Direction::West,
            &provider,
            &mut scratch,
            &AlignmentConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, StitchError::NotLoaded { what: "pixels", .. }));
    }
}
