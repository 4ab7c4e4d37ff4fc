/// Stages reported while stitching.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Alignment,
    Refinement,
    Writing,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Alignment => write!(f, "Computing pairwise translations"),
            Self::Refinement => write!(f, "Refining translations"),
            Self::Writing => write!(f, "Writing output"),
        }
    }
}

/// Thread-safe progress reporting.
///
/// Implementors can use this to drive progress bars or logging. All methods
/// have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    /// A new stage has started. `total_items` is the number of work items
    /// (tiles or edges), if known.
    fn begin_stage(&self, _stage: Stage, _total_items: Option<usize>) {}

    /// `items_done` work items of the current stage have completed.
    fn advance(&self, _items_done: usize) {}

    fn finish_stage(&self) {}
}

pub struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}
