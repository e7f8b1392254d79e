//! Optimization pipeline actions.

mod process;
mod queries;
mod start;

pub use process::{complete_job, fail_job, run_optimization_step};
pub use queries::{active_optimization, get_optimization};
pub use start::start_optimization;
