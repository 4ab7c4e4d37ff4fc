/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Score reported for an undefined correlation (empty or zero-variance window).
/// Compares as the worst possible score.
pub const SENTINEL_SCORE: f64 = -1.0;

/// A window is treated as constant when its variance is at most
/// `ZERO_VARIANCE_ULPS * n * f64::EPSILON` times its sum of squares, which
/// bounds the rounding left by summing `n` equal values. Real texture, even
/// 1-LSB noise on a bright 16-bit field, sits orders of magnitude above it.
pub const ZERO_VARIANCE_ULPS: f64 = 2.0;

/// Magnitude below which a cross-power spectrum bin is treated as zero.
pub const CROSS_POWER_EPSILON: f64 = 1e-12;

/// Default number of correlation-surface maxima checked per tile pair.
pub const DEFAULT_NUM_PEAKS: usize = 2;

/// Default half-width (pixels) of the hill-climbing window around the
/// disambiguated FFT peak.
pub const DEFAULT_REFINE_RADIUS: i32 = 10;

/// Extra slots added to the pooled backend capacity on top of the grid
/// diagonal length.
pub const POOL_SLACK_SLOTS: usize = 20;

/// Minimum correlation for an edge to count as valid during refinement.
pub const DEFAULT_MIN_VALID_SCORE: f64 = 0.5;

/// Upper bound on the repeatability (pixels) used to size refinement windows.
pub const DEFAULT_MAX_REPEATABILITY: i32 = 10;

/// Name of the background optimization thread.
pub const WORKER_THREAD_NAME: &str = "tilestitch-optimizer";
