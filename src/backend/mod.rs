//! Measurement backends.
//!
//! A backend turns a compiled blueprint into a [`Report`]. Implementors only
//! describe how to invoke their tool and how to read its output; the shared
//! [`Backend::measure`] takes care of missing binaries, report caching and
//! failures.

pub mod profiler;
pub mod simulator;

use std::fs;
use std::path::Path;
use std::time::Duration;

use log::debug;

pub use profiler::Profiler;
pub use simulator::{Simulator, SimulatorMode};

use crate::matrix::{Blueprint, ReportKind};
use crate::report::{Report, Stage};
use crate::utils::process::{self, Capture, Invocation};

/// How a backend treats an existing report file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CachePolicy {
    /// Always run the tool.
    #[default]
    Refresh,
    /// Read the report file if present, run the tool otherwise.
    Reuse,
    /// Read the report file if present, fail otherwise.
    ReuseOnly,
}

impl CachePolicy {
    pub fn from_flags(use_cache: bool, reuse_only: bool) -> Self {
        match (use_cache, reuse_only) {
            (_, true) => Self::ReuseOnly,
            (true, false) => Self::Reuse,
            (false, false) => Self::Refresh,
        }
    }
}

/// Trait that every measurement backend implements
pub trait Backend: Send + Sync {
    /// Tag attached to the reports of this backend
    fn stage(&self) -> Stage;

    /// Which report file of a blueprint this backend owns
    fn report_kind(&self) -> ReportKind;

    fn cache_policy(&self) -> CachePolicy;

    /// Upper bound for one tool run
    fn timeout(&self) -> Duration;

    /// Command measuring `blueprint`
    fn invocation(&self, blueprint: &Blueprint) -> Invocation;

    /// Turn the content of a report file into a report.
    /// Unparsable content yields [`Report::Failed`].
    fn parse(&self, binary: &Path, text: &str) -> Report;

    /// Measure one blueprint.
    ///
    /// Fresh output is first written to the report file and then read back,
    /// so a cache hit and a fresh run go through the very same parsing.
    fn measure(&self, blueprint: &Blueprint) -> Report {
        let stage = self.stage();
        let binary = &blueprint.binary;
        if !binary.exists() {
            debug!("{stage} aborted: {} does not exist.", binary.display());
            return Report::failed(binary, stage);
        }

        let report_path = blueprint.report_path(self.report_kind());
        match (self.cache_policy(), report_path.exists()) {
            (CachePolicy::ReuseOnly, false) => {
                debug!("{stage} skipped: no {} on disk.", report_path.display());
                return Report::failed(binary, stage);
            }
            (CachePolicy::Reuse | CachePolicy::ReuseOnly, true) => {
                debug!("{stage} reloaded from {}.", report_path.display());
            }
            _ => {
                debug!("{stage} on {}.", binary.display());
                let invocation = self.invocation(blueprint);
                let outcome = process::execute(&invocation, Some(self.timeout()), Capture::Combined, Some(report_path));
                if !outcome.success {
                    return Report::failed(binary, stage);
                }
            }
        }

        match fs::read_to_string(report_path) {
            Ok(text) => self.parse(binary, &text),
            Err(e) => {
                debug!("{stage}: cannot read {}: {e}", report_path.display());
                Report::failed(binary, stage)
            }
        }
    }
}
