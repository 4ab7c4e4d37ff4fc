pub mod orchestrator;
pub mod refine;

pub use orchestrator::{Orchestrator, RunOutcome, RunSummary, WorkerFault};
pub use refine::{RefineStats, RefinementStage, RepeatabilityRefinement};
