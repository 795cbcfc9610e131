//! Timing simulator (GUS).
//!
//! The detailed mode yields a cycle estimate. The sensitivity mode emits a
//! small table scoring how much each hardware resource limits the kernel.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use log::debug;

use super::{Backend, CachePolicy};
use crate::config::SimulatorConfig;
use crate::matrix::{Blueprint, ReportKind};
use crate::report::{Report, Stage, CYCLES};
use crate::utils::extract::parse_int;
use crate::utils::process::Invocation;

pub const SIMULATION_TIMEOUT: Duration = Duration::from_secs(300);
pub const SENSITIVITY_TIMEOUT: Duration = Duration::from_secs(900);

const EXECUTION_TIME: &str = "EXECUTION TIME:(.*)cycles";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimulatorMode {
    Detailed,
    Sensitivity,
}

pub struct Simulator {
    config: SimulatorConfig,
    mode: SimulatorMode,
    cache: CachePolicy,
}

impl Simulator {
    pub fn new(config: &SimulatorConfig, mode: SimulatorMode, cache: CachePolicy) -> Self {
        Self {
            config: config.clone(),
            mode,
            cache,
        }
    }

    pub fn detailed(config: &SimulatorConfig, cache: CachePolicy) -> Self {
        Self::new(config, SimulatorMode::Detailed, cache)
    }

    pub fn sensitivity(config: &SimulatorConfig, cache: CachePolicy) -> Self {
        Self::new(config, SimulatorMode::Sensitivity, cache)
    }

    pub fn mode(&self) -> SimulatorMode {
        self.mode
    }
}

impl Backend for Simulator {
    fn stage(&self) -> Stage {
        match self.mode {
            SimulatorMode::Detailed => Stage::Simulation,
            SimulatorMode::Sensitivity => Stage::Sensitivity,
        }
    }

    fn report_kind(&self) -> ReportKind {
        match self.mode {
            SimulatorMode::Detailed => ReportKind::Simulation,
            SimulatorMode::Sensitivity => ReportKind::Sensitivity,
        }
    }

    fn cache_policy(&self) -> CachePolicy {
        self.cache
    }

    fn timeout(&self) -> Duration {
        match self.mode {
            SimulatorMode::Detailed => SIMULATION_TIMEOUT,
            SimulatorMode::Sensitivity => SENSITIVITY_TIMEOUT,
        }
    }

    fn invocation(&self, blueprint: &Blueprint) -> Invocation {
        let invocation = Invocation::from_tokens(self.config.program.split_whitespace())
            .args(["--L1-size", self.config.l1_size.as_str()])
            .args(["--L2-size", self.config.l2_size.as_str()])
            .args(["--L3-size", self.config.l3_size.as_str()])
            .args(["--kernel", blueprint.kernel.as_str()])
            .arg(blueprint.binary.to_string_lossy());
        match self.mode {
            SimulatorMode::Detailed => invocation,
            SimulatorMode::Sensitivity => invocation
                .arg("-s")
                .arg("--pdf-out")
                .arg(format!("{}.pdf", blueprint.sensitivity_report.display())),
        }
    }

    fn parse(&self, binary: &Path, text: &str) -> Report {
        match self.mode {
            SimulatorMode::Detailed => parse_detailed(binary, text),
            SimulatorMode::Sensitivity => parse_sensitivity(binary, text, self.config.sensitivity_threshold),
        }
    }
}

/// Read the cycle estimate of a detailed simulation.
pub fn parse_detailed(binary: &Path, text: &str) -> Report {
    match parse_int(EXECUTION_TIME, text) {
        Some(cycles) => Report::Measured {
            binary: binary.to_path_buf(),
            stage: Stage::Simulation,
            bottlenecks: Vec::new(),
            metrics: [(CYCLES.to_string(), cycles as f64)].into_iter().collect(),
            raw: text.to_string(),
        },
        None => {
            debug!("no execution time in the simulation of {}", binary.display());
            Report::failed(binary, Stage::Simulation)
        }
    }
}

/// Read a sensitivity table.
///
/// The first line is a comment, then comes a CSV table whose first column
/// names the resource and whose last column is its score; rows may end with
/// `;`. Every resource scoring strictly above `threshold` is a bottleneck.
pub fn parse_sensitivity(binary: &Path, text: &str, threshold: f64) -> Report {
    match sensitivity_table(text) {
        Some(rows) => {
            let bottlenecks = rows
                .iter()
                .filter(|(_, score)| *score > threshold)
                .map(|(resource, _)| resource.clone())
                .collect();
            Report::Measured {
                binary: binary.to_path_buf(),
                stage: Stage::Sensitivity,
                bottlenecks,
                metrics: rows.into_iter().collect::<BTreeMap<_, _>>(),
                raw: text.to_string(),
            }
        }
        None => {
            debug!("Fail to parse the sensitivity report for {}", binary.display());
            Report::failed(binary, Stage::Sensitivity)
        }
    }
}

/// `(resource, score)` rows in table order. Rows whose score is not a
/// number are dropped; a missing header or a row wider than the header
/// makes the whole table unreadable.
fn sensitivity_table(text: &str) -> Option<Vec<(String, f64)>> {
    let mut lines = text
        .lines()
        .skip(1)
        .map(|line| line.replace(';', ""))
        .filter(|line| !line.trim().is_empty());

    let header = lines.next()?;
    let width = header.split(',').count();

    let mut rows = Vec::new();
    for line in lines {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() > width {
            return None;
        }
        let resource = fields[0].to_string();
        // A short row leaves the score column empty.
        if fields.len() < width {
            continue;
        }
        if let Some(score) = fields.last().and_then(|s| s.parse::<f64>().ok()) {
            if score.is_finite() {
                rows.push((resource, score));
            }
        }
    }
    Some(rows)
}
