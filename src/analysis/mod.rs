//! Analysis modules.
//!
//! Planning decides which data files feed which aggregate; aggregation
//! merges them; the step ties both to one module's turn in the build.

pub mod aggregator;
pub mod paths;
pub mod planner;
pub mod step;

pub use step::{describe_step, run_report_step, StepOptions, StepOutcome};
