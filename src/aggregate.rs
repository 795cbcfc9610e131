//! Result table and simulator accuracy.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use log::debug;

use crate::config::{Detection, StageToggles};
use crate::error::{Error, Result};
use crate::matrix::{Blueprint, Matrix};
use crate::report::Report;

/// Relative errors beyond this are left out of the lifted mean.
pub const LIFTED_ERROR_BOUND: f64 = 10.0;

pub const BENCHMARK: &str = "benchmark";
pub const PROFILER_CYCLES: &str = "profiler cycles";
pub const PROFILER_BOTTLENECKS: &str = "profiler bottlenecks";
pub const PROFILER_SUSPICIOUS: &str = "profiler suspicious";
pub const SIMULATOR_CYCLES: &str = "simulator cycles";
pub const SIMULATOR_BOTTLENECKS: &str = "simulator bottlenecks";
pub const SIMULATOR_SUSPICIOUS: &str = "simulator suspicious";
pub const RELATIVE_ERROR: &str = "relative error";

pub type Suspicions = BTreeMap<PathBuf, Vec<String>>;

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `(simulated - measured) / measured`, rounded to two decimals.
pub fn relative_error(simulated: f64, measured: f64) -> Option<f64> {
    if measured == 0.0 {
        return None;
    }
    Some(round2((simulated - measured) / measured))
}

/// Mean absolute relative error of the simulator against the profiler.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ErrorStats {
    sum: f64,
    pairs: usize,
    lifted_sum: f64,
    lifted_pairs: usize,
}

impl ErrorStats {
    pub fn add(&mut self, simulated: f64, measured: f64) {
        if measured == 0.0 {
            return;
        }
        let error = ((simulated - measured) / measured).abs();
        self.sum += error;
        self.pairs += 1;
        if error <= LIFTED_ERROR_BOUND {
            self.lifted_sum += error;
            self.lifted_pairs += 1;
        }
        debug!(
            "simulator MRE: {:?}, lifted: {:?}",
            self.mean(),
            self.lifted_mean()
        );
    }

    pub fn pairs(&self) -> usize {
        self.pairs
    }

    pub fn lifted_pairs(&self) -> usize {
        self.lifted_pairs
    }

    pub fn mean(&self) -> Option<f64> {
        (self.pairs > 0).then(|| round2(self.sum / self.pairs as f64))
    }

    pub fn lifted_mean(&self) -> Option<f64> {
        (self.lifted_pairs > 0).then(|| round2(self.lifted_sum / self.lifted_pairs as f64))
    }

    /// Accumulate over every blueprint whose profile and simulation both
    /// carry a cycle count.
    pub fn collect(blueprints: &[&Blueprint], profile: &HashMap<PathBuf, Report>, simulator: &HashMap<PathBuf, Report>) -> Self {
        let mut stats = Self::default();
        for blueprint in blueprints {
            let measured = profile.get(&blueprint.binary).and_then(Report::cycles);
            let simulated = simulator.get(&blueprint.binary).and_then(Report::cycles);
            if let (Some(simulated), Some(measured)) = (simulated, measured) {
                stats.add(simulated, measured);
            }
        }
        stats
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
    Set(Vec<String>),
    Empty,
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Text(text) => f.write_str(text),
            Cell::Number(value) => {
                // -0.0 == 0.0, so this also drops the sign of a negative zero.
                let value = if *value == 0.0 { 0.0 } else { *value };
                if value.fract() == 0.0 && value.abs() < 1e15 {
                    write!(f, "{value:.0}")
                } else {
                    write!(f, "{value}")
                }
            }
            Cell::Set(items) => write!(f, "[{}]", items.join("+")),
            Cell::Empty => Ok(()),
        }
    }
}

/// What the table is built from.
pub struct TableInputs<'a> {
    pub stages: StageToggles,
    pub detect: Detection,
    pub profile: Option<&'a HashMap<PathBuf, Report>>,
    pub simulator: Option<&'a HashMap<PathBuf, Report>>,
    pub profile_suspicious: Option<&'a Suspicions>,
    pub simulator_suspicious: Option<&'a Suspicions>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResultTable {
    pub columns: Vec<&'static str>,
    pub rows: Vec<Vec<Cell>>,
}

impl ResultTable {
    pub fn columns_for(stages: &StageToggles, detect: &Detection) -> Vec<&'static str> {
        let mut columns = vec![BENCHMARK];
        if stages.profile {
            columns.extend([PROFILER_CYCLES, PROFILER_BOTTLENECKS]);
            if detect.profiler {
                columns.push(PROFILER_SUSPICIOUS);
            }
        }
        if stages.simulate {
            columns.push(SIMULATOR_CYCLES);
        }
        if stages.sensitivity {
            columns.push(SIMULATOR_BOTTLENECKS);
            if detect.simulator {
                columns.push(SIMULATOR_SUSPICIOUS);
            }
        }
        if stages.profile && stages.simulate {
            columns.push(RELATIVE_ERROR);
        }
        columns
    }

    /// One row per selected blueprint whose enabled stages all succeeded,
    /// in matrix order.
    ///
    /// When profiler anomalies are looked for, a group whose original failed
    /// to profile is dropped entirely: its mutants have nothing to be
    /// compared against.
    pub fn pack(matrix: &Matrix, selection: &[&Blueprint], inputs: &TableInputs<'_>) -> Self {
        let columns = Self::columns_for(&inputs.stages, &inputs.detect);
        let selected: std::collections::HashSet<&Path> = selection.iter().map(|b| b.binary.as_path()).collect();
        let succeeded = |reports: Option<&HashMap<PathBuf, Report>>, binary: &Path| {
            reports.and_then(|r| r.get(binary)).is_some_and(Report::is_success)
        };

        let mut rows = Vec::new();
        for group in matrix.groups() {
            if inputs.stages.profile && inputs.detect.profiler && !succeeded(inputs.profile, group.original.as_path()) {
                debug!("{} failed to profile, group skipped", group.original.display());
                continue;
            }
            for blueprint in matrix.members(group) {
                let binary = blueprint.binary.as_path();
                if !selected.contains(binary)
                    || (inputs.stages.profile && !succeeded(inputs.profile, binary))
                    || (inputs.stages.any_simulation() && !succeeded(inputs.simulator, binary))
                {
                    continue;
                }
                rows.push(Self::row(&columns, binary, inputs));
            }
        }
        Self { columns, rows }
    }

    fn row(columns: &[&'static str], binary: &Path, inputs: &TableInputs<'_>) -> Vec<Cell> {
        let profile = inputs.profile.and_then(|r| r.get(binary));
        let simulator = inputs.simulator.and_then(|r| r.get(binary));
        let cycles = |report: Option<&Report>| report.and_then(Report::cycles).map_or(Cell::Empty, Cell::Number);
        let bottlenecks = |report: Option<&Report>| {
            report
                .and_then(Report::bottlenecks)
                .map_or(Cell::Empty, |b| Cell::Set(b.to_vec()))
        };
        let suspicious = |map: Option<&Suspicions>| {
            map.and_then(|m| m.get(binary))
                .map_or(Cell::Empty, |s| Cell::Set(s.clone()))
        };

        columns
            .iter()
            .map(|&column| match column {
                BENCHMARK => Cell::Text(binary.display().to_string()),
                PROFILER_CYCLES => cycles(profile),
                PROFILER_BOTTLENECKS => bottlenecks(profile),
                PROFILER_SUSPICIOUS => suspicious(inputs.profile_suspicious),
                SIMULATOR_CYCLES => cycles(simulator),
                SIMULATOR_BOTTLENECKS => bottlenecks(simulator),
                SIMULATOR_SUSPICIOUS => suspicious(inputs.simulator_suspicious),
                RELATIVE_ERROR => match (simulator.and_then(Report::cycles), profile.and_then(Report::cycles)) {
                    (Some(sim), Some(prof)) => relative_error(sim, prof).map_or(Cell::Empty, Cell::Number),
                    _ => Cell::Empty,
                },
                _ => Cell::Empty,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Write the table as delimited text, header first.
    pub fn write_to<W: Write>(&self, out: &mut W, delimiter: char) -> std::io::Result<()> {
        let separator = delimiter.to_string();
        writeln!(out, "{}", self.columns.join(separator.as_str()))?;
        for row in &self.rows {
            let cells: Vec<String> = row.iter().map(Cell::to_string).collect();
            writeln!(out, "{}", cells.join(separator.as_str()))?;
        }
        Ok(())
    }

    pub fn export(&self, path: &Path, delimiter: char) -> Result<()> {
        let file = File::create(path).map_err(|e| Error::io(path, e))?;
        let mut out = BufWriter::new(file);
        self.write_to(&mut out, delimiter)
            .and_then(|_| out.flush())
            .map_err(|e| Error::io(path, e))
    }
}
