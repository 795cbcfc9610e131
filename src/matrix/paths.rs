//! Deterministic file layout of every artifact.
//!
//! ```text
//! <fuzz>/<radical>.<mutation><src-ext>               mutated source
//! <build>/<radical>[.<mutation>].<compiler><bin-ext>  binary
//! <reports>/<binary-name>.<kind>                      report
//! ```

use std::path::{Path, PathBuf};

use crate::config::Directories;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReportKind {
    Profile,
    Simulation,
    Sensitivity,
}

impl ReportKind {
    pub const ALL: [ReportKind; 3] = [Self::Profile, Self::Simulation, Self::Sensitivity];

    pub fn extension(self) -> &'static str {
        match self {
            Self::Profile => "profile",
            Self::Simulation => "sim",
            Self::Sensitivity => "sim-sensitivity",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub source: PathBuf,
    pub binary: PathBuf,
    pub profile_report: PathBuf,
    pub sim_report: PathBuf,
    pub sensitivity_report: PathBuf,
}

/// Paths of the artifact built from `original` with the given mutation
/// (`None` for the original itself) and compiler suffixes.
pub fn resolve(
    dirs: &Directories,
    binary_extension: &str,
    original: &Path,
    mutation: Option<&str>,
    compiler: &str,
) -> ArtifactPaths {
    let radical = original
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let source_ext = original
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let (source, binary_name) = match mutation {
        None => (
            original.to_path_buf(),
            format!("{radical}.{compiler}{binary_extension}"),
        ),
        Some(suffix) => (
            dirs.fuzz.join(format!("{radical}.{suffix}{source_ext}")),
            format!("{radical}.{suffix}.{compiler}{binary_extension}"),
        ),
    };
    let report = |kind: ReportKind| dirs.reports.join(format!("{binary_name}.{}", kind.extension()));

    ArtifactPaths {
        source,
        binary: dirs.build.join(&binary_name),
        profile_report: report(ReportKind::Profile),
        sim_report: report(ReportKind::Simulation),
        sensitivity_report: report(ReportKind::Sensitivity),
    }
}
