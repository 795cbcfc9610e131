//! Measurement reports.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Metric holding the cycle count in every backend report.
pub const CYCLES: &str = "cycles";

/// Which backend (or combination of backends) produced a report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Profile,
    Simulation,
    Sensitivity,
    /// Detailed simulation merged with its sensitivity analysis.
    SimulationWithSensitivity,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Profile => "TAM report",
            Self::Simulation => "Gus report",
            Self::Sensitivity => "Sens report",
            Self::SimulationWithSensitivity => "Gus report + Sens report",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one measurement attempt against one binary.
#[derive(Clone, Debug, PartialEq)]
pub enum Report {
    Failed {
        binary: PathBuf,
        stage: Stage,
    },
    Measured {
        binary: PathBuf,
        stage: Stage,
        bottlenecks: Vec<String>,
        metrics: BTreeMap<String, f64>,
        raw: String,
    },
}

impl Report {
    pub fn failed(binary: impl Into<PathBuf>, stage: Stage) -> Self {
        Report::Failed {
            binary: binary.into(),
            stage,
        }
    }

    pub fn binary(&self) -> &Path {
        match self {
            Report::Failed { binary, .. } | Report::Measured { binary, .. } => binary,
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            Report::Failed { stage, .. } | Report::Measured { stage, .. } => *stage,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Report::Measured { .. })
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        match self {
            Report::Measured { metrics, .. } => metrics.get(name).copied(),
            Report::Failed { .. } => None,
        }
    }

    pub fn cycles(&self) -> Option<f64> {
        self.metric(CYCLES)
    }

    /// Bottlenecks of a successful report, `None` for a failed one.
    pub fn bottlenecks(&self) -> Option<&[String]> {
        match self {
            Report::Measured { bottlenecks, .. } => Some(bottlenecks),
            Report::Failed { .. } => None,
        }
    }

    /// Merge a detailed simulation report with the sensitivity report of the
    /// same binary: bottlenecks come from the sensitivity analysis, metrics
    /// from both. Fails as soon as one side failed.
    pub fn merge_simulation(detailed: &Report, sensitivity: &Report) -> Report {
        match (detailed, sensitivity) {
            (
                Report::Measured {
                    binary,
                    metrics: detailed_metrics,
                    raw: detailed_raw,
                    ..
                },
                Report::Measured {
                    bottlenecks,
                    metrics: sensitivity_metrics,
                    raw: sensitivity_raw,
                    ..
                },
            ) => {
                let mut metrics = sensitivity_metrics.clone();
                metrics.extend(detailed_metrics.iter().map(|(k, v)| (k.clone(), *v)));
                Report::Measured {
                    binary: binary.clone(),
                    stage: Stage::SimulationWithSensitivity,
                    bottlenecks: bottlenecks.clone(),
                    metrics,
                    raw: format!("{sensitivity_raw}{detailed_raw}"),
                }
            }
            _ => Report::failed(detailed.binary(), Stage::SimulationWithSensitivity),
        }
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Report::Failed { .. } => Ok(()),
            Report::Measured {
                bottlenecks,
                metrics,
                ..
            } => {
                for (name, value) in metrics {
                    writeln!(f, "{name}: {value}")?;
                }
                write!(f, "bottlenecks: {bottlenecks:?}")
            }
        }
    }
}
