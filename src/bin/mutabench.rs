//! Command-line front end.
//!
//! Usage:
//!   mutabench --sources gemm.c --kernels kernel_gemm --versions-conf rules.conf
//!   mutabench --sources-conf polybench.conf --enable-gus --csv-output out.csv
//!   mutabench --sources-conf polybench.conf --fool-tam --use-cache --debug

use std::path::PathBuf;

use clap::Parser;
use mutabench::config::{
    self, CompileOptions, CompilerConfig, Detection, Directories, HarnessConfig, MatrixInputs, ProfilerConfig,
    SimulatorConfig, StageToggles, DEFAULT_COMPILER, DEFAULT_HUGE_PAGES_LIB,
};
use mutabench::error::Result;
use mutabench::tui;

#[derive(Parser, Debug)]
#[command(name = "mutabench")]
#[command(about = "Highlight microarchitectural bottlenecks that contradict a measured speedup")]
struct Args {
    /// The C files to be analyzed
    #[arg(long, num_args = 1.., required_unless_present = "sources_conf", conflicts_with = "sources_conf")]
    sources: Vec<PathBuf>,

    /// File listing `<source> <kernel>` pairs
    #[arg(long)]
    sources_conf: Option<PathBuf>,

    /// The symbols to be inspected, one per source
    #[arg(long, num_args = 1..)]
    kernels: Vec<String>,

    /// File listing the versions to generate, as `suffix=command`
    #[arg(long)]
    versions_conf: Option<PathBuf>,

    /// The compiler to use
    #[arg(long, default_value = DEFAULT_COMPILER, allow_hyphen_values = true)]
    compiler: String,

    /// File listing the compilers to use, as `suffix=command`
    #[arg(long, conflicts_with = "compiler")]
    compilers_conf: Option<PathBuf>,

    /// The auxiliary C files required to produce the executable
    #[arg(long, num_args = 0..)]
    always_link_with: Vec<PathBuf>,

    /// The directories where header files live
    #[arg(long, num_args = 0..)]
    include_dir: Vec<PathBuf>,

    /// The options to feed the linker with
    #[arg(long, num_args = 0.., default_value = "-lm", allow_hyphen_values = true)]
    linker_options: Vec<String>,

    /// Appended to every binary name
    #[arg(long, default_value = "")]
    binary_extension: String,

    /// Log the compiler output instead of discarding it
    #[arg(long)]
    capture_compiler_output: bool,

    /// The directory in which to generate binaries
    #[arg(long, default_value = "/tmp")]
    build_directory: PathBuf,

    /// The directory in which to generate versions
    #[arg(long, default_value = "/tmp")]
    fuzz_directory: PathBuf,

    /// The directory in which to save reports
    #[arg(long, default_value = "/tmp")]
    reports_directory: PathBuf,

    /// Size of the L1 cache, in bytes or with a k, m or g suffix
    #[arg(long, default_value = "49152")]
    l1_size: String,

    /// Size of the L2 cache
    #[arg(long, default_value = "524288")]
    l2_size: String,

    /// Size of the L3 cache
    #[arg(long, default_value = "16777216")]
    l3_size: String,

    /// Resources whose sensitivity score exceeds this are bottlenecks
    #[arg(long, default_value_t = 0.0)]
    sensitivity_threshold: f64,

    /// The install dir of tma-scope; profile through DynamoRIO when given
    #[arg(long)]
    tma_scope_install_dir: Option<PathBuf>,

    /// Profiler command prefix
    #[arg(long, default_value = "perf")]
    profiler: String,

    /// Simulator command prefix
    #[arg(long, default_value = "gus")]
    simulator: String,

    /// The core on which the profiler runs
    #[arg(long, default_value_t = 0)]
    perf_core: usize,

    /// Back the profiled binaries with huge pages
    #[arg(long)]
    use_huge_pages: bool,

    /// The huge pages library to preload
    #[arg(long, default_value = DEFAULT_HUGE_PAGES_LIB)]
    lib_huge: PathBuf,

    /// Reuse intermediate files when they exist
    #[arg(long)]
    use_cache: bool,

    /// Only read existing profile reports, never run the profiler
    #[arg(long, alias = "reuse-profile-reports")]
    reuse_perf_reports: bool,

    /// The file in which to write the result table
    #[arg(long)]
    csv_output: Option<PathBuf>,

    /// Field separator of the result table
    #[arg(long, default_value_t = ',')]
    delimiter: char,

    /// Sample N blueprints (don't sample if 0)
    #[arg(long, default_value_t = 0)]
    sample: usize,

    /// Seed of the sampling
    #[arg(long)]
    seed: Option<u64>,

    /// Workers of the parallel stages (default: hardware threads)
    #[arg(long, short = 'j')]
    jobs: Option<usize>,

    /// Do not generate the versions
    #[arg(long)]
    skip_mutation: bool,

    /// Do not build the binaries
    #[arg(long)]
    skip_compilation: bool,

    /// Disable the counter profiler
    #[arg(long)]
    disable_tam: bool,

    /// Enable the detailed simulation
    #[arg(long)]
    enable_gus: bool,

    /// Enable the sensitivity analysis
    #[arg(long)]
    enable_sensitivity: bool,

    /// Look for suspicious profiler bottlenecks
    #[arg(long, conflicts_with = "disable_tam")]
    fool_tam: bool,

    /// Look for suspicious simulator bottlenecks
    #[arg(long, requires = "enable_gus", requires = "enable_sensitivity")]
    fool_gus: bool,

    /// Print debug messages
    #[arg(long)]
    debug: bool,

    /// Print every report on stdout
    #[arg(long)]
    verbose_output: bool,
}

impl Args {
    fn into_config(self) -> Result<HarnessConfig> {
        let sources = match &self.sources_conf {
            Some(path) => config::read_sources_file(path)?,
            None => config::pair_sources(self.sources, self.kernels)?,
        };
        let rules = match &self.versions_conf {
            Some(path) => config::read_rules_file(path)?,
            None => Vec::new(),
        };
        let compilers = match &self.compilers_conf {
            Some(path) => config::read_compilers_file(path)?,
            None => vec![CompilerConfig::from_command(&self.compiler)?],
        };

        Ok(HarnessConfig {
            matrix: MatrixInputs {
                sources,
                rules,
                compilers,
            },
            dirs: Directories {
                fuzz: self.fuzz_directory,
                build: self.build_directory,
                reports: self.reports_directory,
            },
            compile: CompileOptions {
                include_dirs: self.include_dir,
                link_with: self.always_link_with,
                linker_options: self.linker_options,
                binary_extension: self.binary_extension,
                capture_output: self.capture_compiler_output,
            },
            profiler: ProfilerConfig {
                program: self.profiler,
                tma_scope_dir: self.tma_scope_install_dir,
                core: self.perf_core,
                huge_pages: self.use_huge_pages.then_some(self.lib_huge),
            },
            simulator: SimulatorConfig {
                program: self.simulator,
                l1_size: self.l1_size,
                l2_size: self.l2_size,
                l3_size: self.l3_size,
                sensitivity_threshold: self.sensitivity_threshold,
            },
            stages: StageToggles {
                mutate: !self.skip_mutation,
                compile: !self.skip_compilation,
                profile: !self.disable_tam,
                simulate: self.enable_gus,
                sensitivity: self.enable_sensitivity,
            },
            detect: Detection {
                profiler: self.fool_tam,
                simulator: self.fool_gus,
            },
            use_cache: self.use_cache,
            reuse_profile_reports: self.reuse_perf_reports,
            sample: (self.sample > 0).then_some(self.sample),
            seed: self.seed,
            jobs: self.jobs,
            table: self.csv_output,
            delimiter: self.delimiter,
            verbose: self.verbose_output,
        })
    }
}

fn run(args: Args) -> Result<()> {
    let config = args.into_config()?;
    tui::print_header();
    let summary = mutabench::run(&config)?;
    tui::print_summary(&summary);
    Ok(())
}

fn main() {
    let args = Args::parse();
    let level = match (args.debug, args.verbose_output) {
        (true, _) => "debug",
        (false, true) => "info",
        (false, false) => "warn",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(err) = run(args) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["mutabench", "--sources", "gemm.c", "--kernels", "kernel_gemm"]).unwrap();
        let config = args.into_config().unwrap();
        assert_eq!(config.matrix.compilers[0].suffix, "clang");
        assert_eq!(config.compile.linker_options, vec!["-lm"]);
        assert_eq!(config.simulator.l2_size, "524288");
        assert_eq!(config.sample, None);
        assert!(config.stages.profile && !config.stages.simulate);
        assert_eq!(config.profiler.huge_pages, None);
    }

    #[test]
    fn test_fool_gus_requires_both_simulations() {
        let parse = |extra: &[&str]| {
            let mut argv = vec!["mutabench", "--sources", "a.c", "--kernels", "k", "--fool-gus"];
            argv.extend_from_slice(extra);
            Args::try_parse_from(argv)
        };
        assert!(parse(&[]).is_err());
        assert!(parse(&["--enable-sensitivity"]).is_err());
        assert!(parse(&["--enable-gus"]).is_err());

        let args = parse(&["--enable-gus", "--enable-sensitivity"]).unwrap();
        let config = args.into_config().unwrap();
        assert!(config.detect.simulator);
        assert!(config.stages.simulate && config.stages.sensitivity);
    }

    #[test]
    fn test_fool_tam_conflicts_with_disable_tam() {
        let result = Args::try_parse_from(["mutabench", "--sources", "a.c", "--kernels", "k", "--fool-tam", "--disable-tam"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_sources_are_required() {
        assert!(Args::try_parse_from(["mutabench"]).is_err());
        assert!(Args::try_parse_from(["mutabench", "--sources", "a.c", "--sources-conf", "s.conf"]).is_err());
    }

    #[test]
    fn test_mismatched_kernels() {
        let args = Args::try_parse_from(["mutabench", "--sources", "a.c", "b.c", "--kernels", "k"]).unwrap();
        assert!(args.into_config().is_err());
    }
}
