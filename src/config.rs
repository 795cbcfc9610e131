//! Harness configuration.
//!
//! [`HarnessConfig`] is built once (by the CLI, or by hand in tests) and then
//! passed by reference to every component. Nothing reads global state.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const DEFAULT_COMPILER: &str = "clang -w -O3 -g -fno-inline -march=native";
pub const DEFAULT_LINKER_OPTIONS: &[&str] = &["-lm"];
pub const DEFAULT_HUGE_PAGES_LIB: &str = "libhugetlbfs-2.23.so";

/// One benchmark: a C file and the symbol of its kernel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceEntry {
    pub source: PathBuf,
    pub kernel: String,
}

/// A source-to-source transformation, applied as
/// `<command> <original> -o <mutant>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MutationRule {
    pub suffix: String,
    pub command: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompilerConfig {
    pub suffix: String,
    pub command: String,
}

impl CompilerConfig {
    /// A configuration named after the compiler program itself.
    pub fn from_command(command: &str) -> Result<Self> {
        let suffix = command
            .split_whitespace()
            .next()
            .ok_or_else(|| Error::EmptyCompiler(command.to_string()))?;
        let suffix = Path::new(suffix)
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| suffix.to_string());
        Ok(Self {
            suffix,
            command: command.to_string(),
        })
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            suffix: "clang".to_string(),
            command: DEFAULT_COMPILER.to_string(),
        }
    }
}

/// Everything the matrix enumerator needs.
#[derive(Clone, Debug, Default)]
pub struct MatrixInputs {
    pub sources: Vec<SourceEntry>,
    pub rules: Vec<MutationRule>,
    pub compilers: Vec<CompilerConfig>,
}

#[derive(Clone, Debug)]
pub struct Directories {
    /// Where mutated sources are written.
    pub fuzz: PathBuf,
    pub build: PathBuf,
    pub reports: PathBuf,
}

impl Default for Directories {
    fn default() -> Self {
        Self {
            fuzz: PathBuf::from("/tmp"),
            build: PathBuf::from("/tmp"),
            reports: PathBuf::from("/tmp"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CompileOptions {
    pub include_dirs: Vec<PathBuf>,
    /// Auxiliary C files linked into every binary.
    pub link_with: Vec<PathBuf>,
    pub linker_options: Vec<String>,
    /// Appended to every binary name (`.exe`, `.GUS`, ...).
    pub binary_extension: String,
    /// Capture compiler output and log it instead of discarding it.
    pub capture_output: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            include_dirs: Vec::new(),
            link_with: Vec::new(),
            linker_options: DEFAULT_LINKER_OPTIONS.iter().map(|s| s.to_string()).collect(),
            binary_extension: String::new(),
            capture_output: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ProfilerConfig {
    /// Command prefix, split on whitespace (`perf`, `sudo perf`, ...).
    pub program: String,
    /// Install directory of the tma-scope DynamoRIO client. When set the
    /// profiler runs under `drrun` instead of `perf stat`.
    pub tma_scope_dir: Option<PathBuf>,
    pub core: usize,
    /// Library preloaded to back the benchmark with huge pages.
    pub huge_pages: Option<PathBuf>,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            program: "perf".to_string(),
            tma_scope_dir: None,
            core: 0,
            huge_pages: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SimulatorConfig {
    /// Command prefix, split on whitespace.
    pub program: String,
    pub l1_size: String,
    pub l2_size: String,
    pub l3_size: String,
    /// Resources scoring strictly above this are bottlenecks.
    pub sensitivity_threshold: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            program: "gus".to_string(),
            l1_size: "49152".to_string(),
            l2_size: "524288".to_string(),
            l3_size: "16777216".to_string(),
            sensitivity_threshold: 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StageToggles {
    pub mutate: bool,
    pub compile: bool,
    pub profile: bool,
    pub simulate: bool,
    pub sensitivity: bool,
}

impl Default for StageToggles {
    fn default() -> Self {
        Self {
            mutate: true,
            compile: true,
            profile: true,
            simulate: false,
            sensitivity: false,
        }
    }
}

impl StageToggles {
    pub fn any_simulation(&self) -> bool {
        self.simulate || self.sensitivity
    }
}

/// Which backends get their bottlenecks checked against the mutants.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Detection {
    pub profiler: bool,
    pub simulator: bool,
}

impl Detection {
    pub fn any(&self) -> bool {
        self.profiler || self.simulator
    }
}

#[derive(Clone, Debug)]
pub struct HarnessConfig {
    pub matrix: MatrixInputs,
    pub dirs: Directories,
    pub compile: CompileOptions,
    pub profiler: ProfilerConfig,
    pub simulator: SimulatorConfig,
    pub stages: StageToggles,
    pub detect: Detection,
    pub use_cache: bool,
    /// Only read existing profile reports, never run the profiler.
    pub reuse_profile_reports: bool,
    pub sample: Option<usize>,
    pub seed: Option<u64>,
    /// Worker cap for the parallel stages (default: hardware threads).
    pub jobs: Option<usize>,
    pub table: Option<PathBuf>,
    pub delimiter: char,
    pub verbose: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            matrix: MatrixInputs::default(),
            dirs: Directories::default(),
            compile: CompileOptions::default(),
            profiler: ProfilerConfig::default(),
            simulator: SimulatorConfig::default(),
            stages: StageToggles::default(),
            detect: Detection::default(),
            use_cache: false,
            reuse_profile_reports: false,
            sample: None,
            seed: None,
            jobs: None,
            table: None,
            delimiter: ',',
            verbose: false,
        }
    }
}

impl HarnessConfig {
    /// Check everything that must hold before any stage runs.
    pub fn validate(&self) -> Result<()> {
        if self.matrix.sources.is_empty() {
            return Err(Error::NoSources);
        }
        for dir in [&self.dirs.fuzz, &self.dirs.build, &self.dirs.reports] {
            if !dir.is_dir() {
                return Err(Error::MissingDirectory(dir.clone()));
            }
        }
        // Suspicions are only defined on cycles plus sensitivity bottlenecks.
        if self.detect.simulator && !(self.stages.simulate && self.stages.sensitivity) {
            return Err(Error::SimulatorDetectionUnmeasured);
        }
        Ok(())
    }
}

/// Non-blank, non-comment lines of a configuration file with their 1-based
/// line numbers.
fn config_lines(path: &Path) -> Result<Vec<(usize, String)>> {
    if !path.exists() {
        return Err(Error::MissingConfigFile(path.to_path_buf()));
    }
    let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    Ok(content
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(i, line)| (i, line.to_string()))
        .collect())
}

fn split_assignment(path: &Path, line: usize, content: &str) -> Result<(String, String)> {
    let malformed = |reason| Error::MalformedLine {
        path: path.to_path_buf(),
        line,
        content: content.to_string(),
        reason,
    };
    let (suffix, command) = content.split_once('=').ok_or_else(|| malformed("expected suffix=command"))?;
    let (suffix, command) = (suffix.trim(), command.trim());
    if suffix.is_empty() {
        return Err(malformed("empty suffix"));
    }
    if command.is_empty() {
        return Err(malformed("empty command"));
    }
    Ok((suffix.to_string(), command.to_string()))
}

/// Parse a sources file: `<source-path> <kernel-symbol>` per line.
pub fn read_sources_file(path: &Path) -> Result<Vec<SourceEntry>> {
    config_lines(path)?
        .into_iter()
        .map(|(line, content)| {
            let mut words = content.split_whitespace();
            match (words.next(), words.next()) {
                (Some(source), Some(kernel)) => Ok(SourceEntry {
                    source: PathBuf::from(source),
                    kernel: kernel.to_string(),
                }),
                _ => Err(Error::MalformedLine {
                    path: path.to_path_buf(),
                    line,
                    content: content.clone(),
                    reason: "expected `<source> <kernel>`",
                }),
            }
        })
        .collect()
}

/// Parse a mutation-rules file: `<suffix>=<command>` per line.
pub fn read_rules_file(path: &Path) -> Result<Vec<MutationRule>> {
    config_lines(path)?
        .into_iter()
        .map(|(line, content)| {
            split_assignment(path, line, &content).map(|(suffix, command)| MutationRule { suffix, command })
        })
        .collect()
}

/// Parse a compiler-configurations file: `<suffix>=<command>` per line.
pub fn read_compilers_file(path: &Path) -> Result<Vec<CompilerConfig>> {
    config_lines(path)?
        .into_iter()
        .map(|(line, content)| {
            split_assignment(path, line, &content).map(|(suffix, command)| CompilerConfig { suffix, command })
        })
        .collect()
}

/// Zip sources given on the command line with their kernels.
pub fn pair_sources(sources: Vec<PathBuf>, kernels: Vec<String>) -> Result<Vec<SourceEntry>> {
    if sources.len() != kernels.len() {
        return Err(Error::LengthMismatch {
            sources: sources.len(),
            kernels: kernels.len(),
        });
    }
    Ok(sources
        .into_iter()
        .zip(kernels)
        .map(|(source, kernel)| SourceEntry { source, kernel })
        .collect())
}
