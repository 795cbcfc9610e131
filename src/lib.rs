//! # Mutabench
//!
//! Differential testing of performance-analysis backends. C kernels are
//! rewritten by source-to-source mutators, built with several compilers and
//! measured by a counter profiler and a timing simulator. A mutant that runs
//! clearly faster than its original while a backend claims one of the
//! original's bottlenecks got worse points at a measurement defect.

pub mod aggregate;
pub mod backend;
pub mod config;
pub mod error;
pub mod matrix;
pub mod oracle;
pub mod pipeline;
pub mod report;
pub mod utils;

/// Re-export tui from utils for the binary
pub use utils::tui;

pub use pipeline::run;

/// Re-export commonly used items
pub mod prelude {
    pub use crate::backend::{Backend, CachePolicy, Profiler, Simulator};
    pub use crate::config::HarnessConfig;
    pub use crate::error::{Error, Result};
    pub use crate::matrix::{Blueprint, Matrix};
    pub use crate::report::{Report, Stage};
}
