pub mod lifecycle;
pub mod scheduler;
mod types;

pub use lifecycle::{LifecycleManager, LifecycleStats};
pub use scheduler::{traverse, TraversalStats};
pub use types::{NoOpReporter, ProgressReporter, Stage};
