//! Fatal errors of the harness.
//!
//! Only configuration mistakes and broken matrix invariants end up here.
//! Anything that goes wrong while mutating, compiling or measuring a single
//! artifact is recorded as a failed [`Report`](crate::report::Report) instead.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration file {0} does not exist")]
    MissingConfigFile(PathBuf),

    #[error("directory {0} does not exist")]
    MissingDirectory(PathBuf),

    #[error("{path}:{line}: malformed entry `{content}` ({reason})")]
    MalformedLine {
        path: PathBuf,
        line: usize,
        content: String,
        reason: &'static str,
    },

    #[error("{sources} sources given for {kernels} kernels")]
    LengthMismatch { sources: usize, kernels: usize },

    #[error("no benchmark source to analyze")]
    NoSources,

    #[error("empty compiler command for configuration `{0}`")]
    EmptyCompiler(String),

    #[error("empty command for mutation `{0}`")]
    EmptyMutation(String),

    #[error("binary path {0} is produced by more than one blueprint")]
    DuplicateBinary(PathBuf),

    #[error("simulator anomaly detection needs both the detailed simulation and the sensitivity analysis")]
    SimulatorDetectionUnmeasured,

    #[error("cannot sample {sample} blueprints out of {total}")]
    SampleTooLarge { sample: usize, total: usize },

    #[error("blueprint {binary} refers to {original}, which is not an original of the matrix")]
    MissingOriginal { binary: PathBuf, original: PathBuf },

    #[error("failed to build the worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
