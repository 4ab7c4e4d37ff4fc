pub mod phase_correlation;

pub use phase_correlation::{align_arrays, phase_correlation_alignment};
