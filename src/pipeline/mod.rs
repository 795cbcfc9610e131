//! # Pipeline
//!
//! Drives the selected blueprints through the stages, in a fixed order:
//!
//! 1. **mutate**: write each mutated source (sequential)
//! 2. **compile**: build every binary (worker pool)
//! 3. **profile**: counter profile, pinned to one core (sequential)
//! 4. **simulate**: detailed timing simulation (worker pool)
//! 5. **sensitivity**: resource sensitivity analysis (sequential)
//!
//! Each stage is joined before the next one starts. A failure only affects
//! the blueprint it happened to.

pub mod pool;
pub mod select;
pub mod test;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info};

pub use pool::WorkerPool;
pub use select::select;

use crate::aggregate::{ErrorStats, ResultTable, Suspicions, TableInputs};
use crate::backend::{Backend, CachePolicy, Profiler, Simulator};
use crate::config::{CompileOptions, HarnessConfig};
use crate::error::Result;
use crate::matrix::{Blueprint, Matrix};
use crate::oracle;
use crate::report::Report;
use crate::utils::cpu_affinity::CpuPinGuard;
use crate::utils::process::{self, Capture, Invocation};
use crate::utils::tui;

pub const MUTATION_TIMEOUT: Duration = Duration::from_secs(120);
pub const COMPILE_TIMEOUT: Duration = Duration::from_secs(120);

/// Reports of one backend, keyed by binary path.
pub type Reports = HashMap<PathBuf, Report>;

/// What happened to one blueprint in the mutate or compile stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageOutcome {
    Done,
    /// The artifact was already there and caching is on.
    Cached,
    /// Nothing to do (no input).
    Skipped,
    Failed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Tally {
    pub done: usize,
    pub cached: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl Tally {
    pub fn record(&mut self, outcome: StageOutcome) {
        match outcome {
            StageOutcome::Done => self.done += 1,
            StageOutcome::Cached => self.cached += 1,
            StageOutcome::Skipped => self.skipped += 1,
            StageOutcome::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.done + self.cached + self.skipped + self.failed
    }

    pub fn log(&self, stage: &str) {
        info!(
            "{stage}: {} done, {} cached, {} skipped, {} failed",
            self.done, self.cached, self.skipped, self.failed
        );
    }
}

impl FromIterator<StageOutcome> for Tally {
    fn from_iter<I: IntoIterator<Item = StageOutcome>>(outcomes: I) -> Self {
        let mut tally = Tally::default();
        for outcome in outcomes {
            tally.record(outcome);
        }
        tally
    }
}

fn successes(reports: &Reports) -> usize {
    reports.values().filter(|r| r.is_success()).count()
}

/// `<rule tokens> <original> -o <mutated>`, `None` for an original.
pub fn mutation_invocation(blueprint: &Blueprint) -> Option<Invocation> {
    let tokens = blueprint.mutation.as_ref()?;
    Some(
        Invocation::from_tokens(tokens.iter().cloned())
            .arg(blueprint.source_original.to_string_lossy())
            .arg("-o")
            .arg(blueprint.source.to_string_lossy()),
    )
}

/// Write the mutated source of `blueprint`.
pub fn mutate(blueprint: &Blueprint, use_cache: bool) -> StageOutcome {
    let Some(invocation) = mutation_invocation(blueprint) else {
        return StageOutcome::Skipped;
    };
    if !blueprint.source_original.exists() {
        debug!("Mutation aborted: {} does not exist.", blueprint.source_original.display());
        return StageOutcome::Skipped;
    }
    if use_cache && blueprint.source.exists() {
        return StageOutcome::Cached;
    }
    let outcome = process::execute(&invocation, Some(MUTATION_TIMEOUT), Capture::Discard, None);
    if outcome.success && blueprint.source.exists() {
        StageOutcome::Done
    } else {
        StageOutcome::Failed
    }
}

/// Directory of the original source, searched for its headers.
fn source_dir(source: &Path) -> PathBuf {
    match source.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// `<compiler tokens> -I <dir>... <source> <link_with>... -o <binary> <linker options>`
pub fn compile_invocation(blueprint: &Blueprint, options: &CompileOptions) -> Invocation {
    let mut invocation = Invocation::from_tokens(blueprint.compile_command.split_whitespace());
    let include_dirs = options
        .include_dirs
        .iter()
        .cloned()
        .chain(std::iter::once(source_dir(&blueprint.source_original)));
    for dir in include_dirs {
        invocation = invocation.arg("-I").arg(dir.to_string_lossy());
    }
    invocation
        .arg(blueprint.source.to_string_lossy())
        .args(options.link_with.iter().map(|p| p.to_string_lossy().into_owned()))
        .arg("-o")
        .arg(blueprint.binary.to_string_lossy())
        .args(options.linker_options.iter().cloned())
}

/// Build the binary of `blueprint`.
pub fn compile(blueprint: &Blueprint, options: &CompileOptions, use_cache: bool) -> StageOutcome {
    if !blueprint.source.exists() {
        debug!("Compilation aborted: {} does not exist.", blueprint.source.display());
        return StageOutcome::Skipped;
    }
    if use_cache && blueprint.binary.exists() {
        return StageOutcome::Cached;
    }
    // A stale binary must not survive a failed build.
    let _ = fs::remove_file(&blueprint.binary);

    let invocation = compile_invocation(blueprint, options);
    let capture = if options.capture_output {
        Capture::Combined
    } else {
        Capture::Discard
    };
    let outcome = process::execute(&invocation, Some(COMPILE_TIMEOUT), capture, None);
    if options.capture_output && !outcome.text.is_empty() {
        debug!("{}:\n{}", blueprint.name(), outcome.text);
    }
    if outcome.success && blueprint.binary.exists() {
        StageOutcome::Done
    } else {
        StageOutcome::Failed
    }
}

/// Reports gathered for a selection.
#[derive(Debug, Default)]
pub struct Measurements {
    pub mutated: Tally,
    pub compiled: Tally,
    /// Profile reports, `None` when the stage is disabled.
    pub profile: Option<Reports>,
    /// Blueprints handed to the simulator.
    pub simulated: Vec<PathBuf>,
    /// Simulator reports (detailed, sensitivity, or both merged).
    pub simulator: Option<Reports>,
}

/// Stage driver. Each parallel stage owns its worker pool.
pub struct Pipeline<'a> {
    config: &'a HarnessConfig,
    compile_pool: WorkerPool,
    simulation_pool: WorkerPool,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a HarnessConfig) -> Result<Self> {
        let compile_pool = WorkerPool::new(config.jobs)?;
        let simulation_pool = WorkerPool::new(config.jobs)?;
        debug!("{} workers per parallel stage", compile_pool.size());
        Ok(Self {
            config,
            compile_pool,
            simulation_pool,
        })
    }

    pub fn mutate_all(&self, selection: &[&Blueprint]) -> Tally {
        let mutants: Vec<&Blueprint> = selection.iter().copied().filter(|b| !b.is_original()).collect();
        tui::print_stage("Mutation", mutants.len());
        let tally: Tally = mutants.iter().map(|b| mutate(b, self.config.use_cache)).collect();
        tally.log("mutation");
        tally
    }

    pub fn compile_all(&self, selection: &[&Blueprint]) -> Tally {
        tui::print_stage("Compilation", selection.len());
        let outcomes = self
            .compile_pool
            .map(selection, |b| compile(b, &self.config.compile, self.config.use_cache));
        let tally: Tally = outcomes.into_values().collect();
        tally.log("compilation");
        tally
    }

    /// Profile sequentially with the driver pinned to the configured core.
    pub fn profile_all(&self, selection: &[&Blueprint]) -> Reports {
        tui::print_stage("Profiling", selection.len());
        let cache = CachePolicy::from_flags(self.config.use_cache, self.config.reuse_profile_reports);
        let profiler = Profiler::new(&self.config.profiler, cache);
        let _pin = CpuPinGuard::with_core(self.config.profiler.core);

        let mut reports = Reports::new();
        for (i, blueprint) in selection.iter().enumerate() {
            debug!("TAM {} ({}/{}).", blueprint.name(), i + 1, selection.len());
            let report = profiler.measure(blueprint);
            self.show(&report);
            reports.insert(blueprint.binary.clone(), report);
        }
        info!("profiling: {}/{} succeeded", successes(&reports), reports.len());
        reports
    }

    pub fn simulate_all(&self, candidates: &[&Blueprint]) -> Reports {
        tui::print_stage("Simulation", candidates.len());
        let cache = CachePolicy::from_flags(self.config.use_cache, false);
        let simulator = Simulator::detailed(&self.config.simulator, cache);
        let reports: Reports = self.simulation_pool.map(candidates, |b| simulator.measure(b));
        for blueprint in candidates {
            if let Some(report) = reports.get(&blueprint.binary) {
                self.show(report);
            }
        }
        info!("simulation: {}/{} succeeded", successes(&reports), reports.len());
        reports
    }

    pub fn sensitivity_all(&self, candidates: &[&Blueprint]) -> Reports {
        tui::print_stage("Sensitivity", candidates.len());
        let cache = CachePolicy::from_flags(self.config.use_cache, false);
        let simulator = Simulator::sensitivity(&self.config.simulator, cache);

        let mut reports = Reports::new();
        for (i, blueprint) in candidates.iter().enumerate() {
            debug!("Sens. {} ({}/{}).", blueprint.name(), i + 1, candidates.len());
            let report = simulator.measure(blueprint);
            self.show(&report);
            reports.insert(blueprint.binary.clone(), report);
        }
        info!("sensitivity: {}/{} succeeded", successes(&reports), reports.len());
        reports
    }

    fn show(&self, report: &Report) {
        if self.config.verbose {
            tui::print_report(report);
        }
    }

    /// Run every enabled stage on `selection`.
    pub fn measure(&self, selection: &[&Blueprint]) -> Measurements {
        let stages = self.config.stages;
        let mut measurements = Measurements::default();

        if stages.mutate {
            measurements.mutated = self.mutate_all(selection);
        }
        if stages.compile {
            measurements.compiled = self.compile_all(selection);
        }
        if stages.profile {
            measurements.profile = Some(self.profile_all(selection));
        }
        if !stages.any_simulation() {
            return measurements;
        }

        let candidates: Vec<&Blueprint> = match &measurements.profile {
            Some(profile) => selection
                .iter()
                .copied()
                .filter(|b| profile.get(&b.binary).is_some_and(Report::is_success))
                .collect(),
            None => selection.to_vec(),
        };
        measurements.simulated = candidates.iter().map(|b| b.binary.clone()).collect();

        let detailed = stages.simulate.then(|| self.simulate_all(&candidates));
        let sensitivity = stages.sensitivity.then(|| self.sensitivity_all(&candidates));
        measurements.simulator = match (detailed, sensitivity) {
            (Some(detailed), Some(sensitivity)) => Some(merge_simulations(&detailed, &sensitivity)),
            (detailed, sensitivity) => detailed.or(sensitivity),
        };
        measurements
    }
}

/// Merge the detailed and sensitivity reports of every binary both saw.
pub fn merge_simulations(detailed: &Reports, sensitivity: &Reports) -> Reports {
    sensitivity
        .iter()
        .filter_map(|(binary, sens)| {
            detailed
                .get(binary)
                .map(|gus| (binary.clone(), Report::merge_simulation(gus, sens)))
        })
        .collect()
}

/// What a run produced.
#[derive(Debug)]
pub struct Summary {
    pub blueprints: usize,
    pub selected: usize,
    pub measurements: Measurements,
    pub profile_suspicious: Option<Suspicions>,
    pub simulator_suspicious: Option<Suspicions>,
    pub errors: Option<ErrorStats>,
    pub table: ResultTable,
}

impl Summary {
    pub fn flagged(suspicions: Option<&Suspicions>) -> Option<usize> {
        suspicions.map(|s| s.values().filter(|c| !c.is_empty()).count())
    }
}

/// Enumerate, measure, compare and tabulate.
pub fn run(config: &HarnessConfig) -> Result<Summary> {
    config.validate()?;
    let matrix = Matrix::enumerate(&config.matrix, &config.dirs, &config.compile.binary_extension)?;
    info!("{} blueprints over {} compiler(s)", matrix.len(), matrix.compilers().len());

    let selection = select(&matrix, config.sample, config.seed, config.detect.any())?;
    let pipeline = Pipeline::new(config)?;
    let measurements = pipeline.measure(&selection);

    let profile_suspicious = match (&measurements.profile, config.detect.profiler) {
        (Some(reports), true) => Some(oracle::find_suspicious_bottlenecks(
            &selection,
            &matrix,
            reports,
            &config.dirs.reports,
        )?),
        _ => None,
    };

    let simulated: Vec<&Blueprint> = measurements
        .simulated
        .iter()
        .filter_map(|binary| matrix.get(binary))
        .collect();
    let simulator_suspicious = match (&measurements.simulator, config.detect.simulator) {
        (Some(reports), true) => Some(oracle::find_suspicious_bottlenecks(
            &simulated,
            &matrix,
            reports,
            &config.dirs.reports,
        )?),
        _ => None,
    };

    let errors = match (&measurements.profile, &measurements.simulator, config.stages.simulate) {
        (Some(profile), Some(simulator), true) => Some(ErrorStats::collect(&simulated, profile, simulator)),
        _ => None,
    };

    let table = ResultTable::pack(
        &matrix,
        &selection,
        &TableInputs {
            stages: config.stages,
            detect: config.detect,
            profile: measurements.profile.as_ref(),
            simulator: measurements.simulator.as_ref(),
            profile_suspicious: profile_suspicious.as_ref(),
            simulator_suspicious: simulator_suspicious.as_ref(),
        },
    );
    if let Some(path) = &config.table {
        table.export(path, config.delimiter)?;
        info!("{} rows written to {}", table.len(), path.display());
    }

    Ok(Summary {
        blueprints: matrix.len(),
        selected: selection.len(),
        measurements,
        profile_suspicious,
        simulator_suspicious,
        errors,
        table,
    })
}
