//! Integer displacement search over a bounded window of the spatial
//! cross-correlation function.

use ndarray::Array2;

use crate::config::SearchStrategy;
use crate::consts::SENTINEL_SCORE;
use crate::correlation::cross_correlation;
use crate::tile::CorrelationEstimate;
use crate::view::WindowedView;

/// How the two tiles of a pair overlap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Orientation {
    /// Neighbour above the current tile: `x ∈ [-w, w]`, `y ∈ [0, h]`.
    UpDown,
    /// Neighbour left of the current tile: `x ∈ [0, w]`, `y ∈ [-h, h]`.
    LeftRight,
}

/// Hill-climbing moves in evaluation order: N, S, E, W, NE, NW, SE, SW.
const CLIMB_MOVES: [(i32, i32); 8] = [
    (0, -1),
    (0, 1),
    (1, 0),
    (-1, 0),
    (1, -1),
    (-1, -1),
    (1, 1),
    (-1, 1),
];

/// Inclusive displacement bounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SearchWindow {
    pub min_x: i32,
    pub max_x: i32,
    pub min_y: i32,
    pub max_y: i32,
}

impl SearchWindow {
    pub const fn new(min_x: i32, max_x: i32, min_y: i32, max_y: i32) -> Self {
        Self {
            min_x,
            max_x,
            min_y,
            max_y,
        }
    }

    /// Square window of half-width `radius` centred on `(x, y)`.
    pub const fn around(x: i32, y: i32, radius: i32) -> Self {
        Self::new(x - radius, x + radius, y - radius, y + radius)
    }

    /// Clamp every bound into the displacements a `height`x`width` tile pair allows.
    pub fn clamp_to(self, orientation: Orientation, height: usize, width: usize) -> Self {
        let h = height as i32;
        let w = width as i32;
        let (x_lo, x_hi, y_lo, y_hi) = match orientation {
            Orientation::UpDown => (-w, w, 0, h),
            Orientation::LeftRight => (0, w, -h, h),
        };
        let cx = |v: i32| v.max(x_lo).min(x_hi);
        let cy = |v: i32| v.max(y_lo).min(y_hi);
        Self::new(cx(self.min_x), cx(self.max_x), cy(self.min_y), cy(self.max_y))
    }

    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        (self.min_x..=self.max_x).contains(&x) && (self.min_y..=self.max_y).contains(&y)
    }

    /// Nearest point inside the window (best effort when empty).
    pub fn clamp_point(&self, x: i32, y: i32) -> (i32, i32) {
        (
            x.max(self.min_x).min(self.max_x),
            y.max(self.min_y).min(self.max_y),
        )
    }

    pub fn width(&self) -> usize {
        (self.max_x - self.min_x + 1).max(0) as usize
    }

    pub fn height(&self) -> usize {
        (self.max_y - self.min_y + 1).max(0) as usize
    }
}

/// Spatial correlation of the overlap implied by displacement `(x, y)`.
///
/// `neighbor` is the west/north tile, `current` the tile being placed;
/// `(x, y)` is the origin of `current` in `neighbor`'s frame. Displacements
/// the tiles cannot realise score [`SENTINEL_SCORE`].
pub fn ccf_at(
    orientation: Orientation,
    neighbor: &Array2<f32>,
    current: &Array2<f32>,
    x: i32,
    y: i32,
) -> f64 {
    let (h, w) = neighbor.dim();
    let (hi, wi) = (h as i32, w as i32);

    let (nr, nc, cr, cc, rows, cols) = match orientation {
        Orientation::UpDown => {
            let y = y.max(0);
            if y > hi || x.abs() > wi {
                return SENTINEL_SCORE;
            }
            let rows = (hi - y) as usize;
            let cols = (wi - x.abs()) as usize;
            if x >= 0 {
                (y as usize, x as usize, 0, 0, rows, cols)
            } else {
                (y as usize, 0, 0, (-x) as usize, rows, cols)
            }
        }
        Orientation::LeftRight => {
            let x = x.max(0);
            if x > wi || y.abs() > hi {
                return SENTINEL_SCORE;
            }
            let rows = (hi - y.abs()) as usize;
            let cols = (wi - x) as usize;
            if y >= 0 {
                (y as usize, x as usize, 0, 0, rows, cols)
            } else {
                (0, x as usize, (-y) as usize, 0, rows, cols)
            }
        }
    };

    let a = WindowedView::new(neighbor, nr, nc, rows, cols);
    let b = WindowedView::new(current, cr, cc, rows, cols);
    cross_correlation(&a, &b)
}

/// Best displacement of `current` against `neighbor` inside `window`.
///
/// The window is clamped to the tile bounds first. When nothing valid is
/// found the clamped start is returned with the sentinel score.
pub fn peak_search(
    window: SearchWindow,
    start: (i32, i32),
    neighbor: &Array2<f32>,
    current: &Array2<f32>,
    orientation: Orientation,
    strategy: SearchStrategy,
) -> CorrelationEstimate {
    let (h, w) = neighbor.dim();
    let window = window.clamp_to(orientation, h, w);
    search_with(window, start, orientation, strategy, |x, y| {
        ccf_at(orientation, neighbor, current, x, y)
    })
}

/// Search `window` (already clamped) with an arbitrary scoring function.
pub fn search_with<F>(
    window: SearchWindow,
    start: (i32, i32),
    orientation: Orientation,
    strategy: SearchStrategy,
    score: F,
) -> CorrelationEstimate
where
    F: FnMut(i32, i32) -> f64,
{
    let (sx, sy) = window.clamp_point(start.0, start.1);
    if window.is_empty() {
        return CorrelationEstimate::sentinel(sx, sy);
    }
    let found = match strategy {
        SearchStrategy::Exhaustive => exhaustive(window, orientation, score),
        SearchStrategy::HillClimb => hill_climb(window, (sx, sy), score),
    };
    match found {
        Some(best) if !best.is_degenerate() => best,
        _ => CorrelationEstimate::sentinel(sx, sy),
    }
}

fn finite_or_sentinel(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        SENTINEL_SCORE
    }
}

/// Scan every displacement; ties go to the last one in scan order.
fn exhaustive<F>(
    window: SearchWindow,
    orientation: Orientation,
    mut score: F,
) -> Option<CorrelationEstimate>
where
    F: FnMut(i32, i32) -> f64,
{
    let mut best: Option<CorrelationEstimate> = None;
    let mut visit = |x: i32, y: i32| {
        let s = finite_or_sentinel(score(x, y));
        if best.map_or(true, |b| s >= b.score) {
            best = Some(CorrelationEstimate::new(s, x, y));
        }
    };

    match orientation {
        Orientation::UpDown => {
            for y in window.min_y..=window.max_y {
                for x in window.min_x..=window.max_x {
                    visit(x, y);
                }
            }
        }
        Orientation::LeftRight => {
            for x in window.min_x..=window.max_x {
                for y in window.min_y..=window.max_y {
                    visit(x, y);
                }
            }
        }
    }
    best
}

/// Greedy ascent from `start`, memoizing every evaluated displacement.
fn hill_climb<F>(
    window: SearchWindow,
    start: (i32, i32),
    mut score: F,
) -> Option<CorrelationEstimate>
where
    F: FnMut(i32, i32) -> f64,
{
    // One padding cell on each side.
    let mut memo = Array2::<f64>::from_elem((window.height() + 2, window.width() + 2), f64::NAN);
    let mut eval = |x: i32, y: i32| -> f64 {
        let idx = [
            (y - window.min_y + 1) as usize,
            (x - window.min_x + 1) as usize,
        ];
        let cached = memo[idx];
        if !cached.is_nan() {
            return cached;
        }
        let s = finite_or_sentinel(score(x, y));
        memo[idx] = s;
        s
    };

    let (mut cx, mut cy) = start;
    let mut current = eval(cx, cy);
    loop {
        let mut step = None;
        let mut best = current;
        for (mx, my) in CLIMB_MOVES {
            let (nx, ny) = (cx + mx, cy + my);
            if !window.contains(nx, ny) {
                continue;
            }
            let s = eval(nx, ny);
            if s > best {
                best = s;
                step = Some((mx, my));
            }
        }
        match step {
            Some((mx, my)) => {
                cx += mx;
                cy += my;
                current = best;
            }
            None => break,
        }
    }
    Some(CorrelationEstimate::new(current, cx, cy))
}

/// Resolve the FFT wrap-around ambiguity of a coarse peak at column `x`,
/// row `y` by testing its eight spatial interpretations. The first maximum wins.
pub fn disambiguate_peak(
    orientation: Orientation,
    neighbor: &Array2<f32>,
    current: &Array2<f32>,
    x: usize,
    y: usize,
) -> CorrelationEstimate {
    let (h, w) = neighbor.dim();
    let x = x.min(w);
    let y = y.min(h);
    let dims = [(y, x), (y, w - x), (h - y, x), (h - y, w - x)];

    let direct = dims.iter().map(|&(nr, nc)| (nc as i32, nr as i32));
    let mirrored = dims.iter().map(|&(nr, nc)| match orientation {
        Orientation::UpDown => (-(nc as i32), nr as i32),
        Orientation::LeftRight => (nc as i32, -(nr as i32)),
    });

    let mut best: Option<CorrelationEstimate> = None;
    for (cx, cy) in direct.chain(mirrored) {
        let s = ccf_at(orientation, neighbor, current, cx, cy);
        let cand = CorrelationEstimate::new(s, cx, cy);
        if best.map_or(true, |b| cand.score > b.score) {
            best = Some(cand);
        }
    }
    best.unwrap_or(CorrelationEstimate::sentinel(0, 0))
}

/// Every score of the clamped window, rows indexed by `y`, columns by `x`.
pub fn correlation_surface(
    window: SearchWindow,
    neighbor: &Array2<f32>,
    current: &Array2<f32>,
    orientation: Orientation,
) -> (SearchWindow, Array2<f64>) {
    let (h, w) = neighbor.dim();
    let window = window.clamp_to(orientation, h, w);
    let surface = Array2::from_shape_fn((window.height(), window.width()), |(r, c)| {
        ccf_at(
            orientation,
            neighbor,
            current,
            window.min_x + c as i32,
            window.min_y + r as i32,
        )
    });
    (window, surface)
}
