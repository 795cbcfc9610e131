//! Utility modules for driving external tools.

pub mod cpu_affinity;
pub mod extract;
pub mod process;
pub mod tui;

// Re-export commonly used items
pub use cpu_affinity::CpuPinGuard;
pub use extract::{parse_float, parse_int};
pub use process::{execute, Capture, Invocation, Outcome};
