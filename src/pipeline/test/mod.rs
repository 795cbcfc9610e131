//! End-to-end tests of the pipeline, with shell scripts standing in for the
//! mutator, the compiler, the profiler and the simulator.

#[cfg(all(test, unix))]
mod tests {
    use crate::config::{
        CompileOptions, CompilerConfig, Detection, Directories, HarnessConfig, MatrixInputs, MutationRule,
        ProfilerConfig, SimulatorConfig, SourceEntry, StageToggles,
    };
    use crate::matrix::Blueprint;
    use crate::pipeline::{compile_invocation, mutate, mutation_invocation, run, Pipeline, StageOutcome};
    use std::fs;
    use std::path::{Path, PathBuf};

    const MUTATOR: &str = "cp \"$1\" \"$3\"\n";

    const COMPILER: &str = r#"out=""
while [ $# -gt 0 ]; do
    if [ "$1" = "-o" ]; then out="$2"; shift; fi
    shift
done
printf 'binary\n' > "$out"
"#;

    // Original: be-bound 50%, fe-bound 15%. Mutant: twice as fast, be-bound
    // 45%, fe-bound 18%.
    const PROFILER: &str = r#"case "$2" in
*.m0.*) c=500000; fe=180; be=450 ;;
*) c=1000000; fe=150; be=500 ;;
esac
printf ' Performance counter stats for %s:\n\n' "$2"
printf '%16s      cycles\n' "$c"
printf '%16s      slots\n' 1000
printf '%16s      topdown-retiring\n' 200
printf '%16s      topdown-bad-spec\n' 30
printf '%16s      topdown-fe-bound\n' "$fe"
printf '%16s      topdown-be-bound\n' "$be"
"#;

    const SIMULATOR: &str = r##"mutant=0; sens=0
for a in "$@"; do
    case "$a" in
    *.m0.*) mutant=1 ;;
    -s) sens=1 ;;
    esac
done
if [ "$sens" = 1 ]; then
    echo "# sensitivity"
    echo "resource,score;"
    if [ "$mutant" = 1 ]; then echo "L1,0.7;"; else echo "L1,0.5;"; fi
    echo "ALU,0.0;"
else
    if [ "$mutant" = 1 ]; then echo "EXECUTION TIME: 600000 cycles"; else echo "EXECUTION TIME: 1100000 cycles"; fi
fi
"##;

    struct Workspace {
        _root: tempfile::TempDir,
        config: HarnessConfig,
        tools: PathBuf,
    }

    fn workspace() -> Workspace {
        let root = tempfile::tempdir().unwrap();
        let base = root.path();
        let dirs = Directories {
            fuzz: base.join("fuzz"),
            build: base.join("build"),
            reports: base.join("reports"),
        };
        let tools = base.join("tools");
        for dir in [&dirs.fuzz, &dirs.build, &dirs.reports, &tools] {
            fs::create_dir(dir).unwrap();
        }
        for (name, script) in [
            ("mutate.sh", MUTATOR),
            ("cc.sh", COMPILER),
            ("perf.sh", PROFILER),
            ("gus.sh", SIMULATOR),
        ] {
            fs::write(tools.join(name), script).unwrap();
        }
        let source = base.join("bench0.c");
        fs::write(&source, "void kernel_bench0(void) {}\nint main(void) { kernel_bench0(); return 0; }\n").unwrap();

        let sh = |name: &str| format!("sh {}", tools.join(name).display());
        let config = HarnessConfig {
            matrix: MatrixInputs {
                sources: vec![SourceEntry {
                    source,
                    kernel: "kernel_bench0".to_string(),
                }],
                rules: vec![MutationRule {
                    suffix: "m0".to_string(),
                    command: sh("mutate.sh"),
                }],
                compilers: vec![CompilerConfig {
                    suffix: "cc".to_string(),
                    command: sh("cc.sh"),
                }],
            },
            dirs,
            compile: CompileOptions::default(),
            profiler: ProfilerConfig {
                program: sh("perf.sh"),
                ..ProfilerConfig::default()
            },
            simulator: SimulatorConfig {
                program: sh("gus.sh"),
                ..SimulatorConfig::default()
            },
            stages: StageToggles {
                simulate: true,
                sensitivity: true,
                ..StageToggles::default()
            },
            detect: Detection {
                profiler: true,
                simulator: true,
            },
            jobs: Some(2),
            table: Some(base.join("out.csv")),
            ..HarnessConfig::default()
        };
        Workspace {
            _root: root,
            config,
            tools,
        }
    }

    /// Table lines without the benchmark path.
    fn table_fields(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| match line.split_once(',') {
                Some((_, rest)) => rest.to_string(),
                None => line.to_string(),
            })
            .collect()
    }

    fn bundles(dir: &Path) -> usize {
        fs::read_dir(dir).unwrap().filter(|e| e.as_ref().unwrap().path().is_dir()).count()
    }

    #[test]
    fn test_full_run() {
        let ws = workspace();
        let summary = run(&ws.config).unwrap();

        assert_eq!(summary.blueprints, 2);
        assert_eq!(summary.selected, 2);
        assert_eq!(summary.measurements.mutated.done, 1);
        assert_eq!(summary.measurements.compiled.done, 2);

        let table = ws.config.table.as_ref().unwrap();
        assert_eq!(
            table_fields(table),
            vec![
                "profiler cycles,profiler bottlenecks,profiler suspicious,simulator cycles,\
                 simulator bottlenecks,simulator suspicious,relative error",
                "1000000,[topdown-be-bound+topdown-fe-bound],[],1100000,[L1],[],0.1",
                "500000,[topdown-be-bound+topdown-fe-bound],[topdown-fe-bound],600000,[L1],[L1],0.2",
            ]
        );

        let errors = summary.errors.unwrap();
        assert_eq!(errors.pairs(), 2);
        assert_eq!(errors.mean(), Some(0.15));

        // One bundle per backend for the mutant.
        assert_eq!(bundles(&ws.config.dirs.reports), 2);
        assert!(ws.config.dirs.reports.join("bench0.m0.cc.profile").exists());
        assert!(ws.config.dirs.reports.join("bench0.m0.cc.sim-sensitivity").exists());
    }

    #[test]
    fn test_cached_run_is_identical() {
        let mut ws = workspace();
        ws.config.use_cache = true;
        run(&ws.config).unwrap();
        let table = ws.config.table.clone().unwrap();
        let first = table_fields(&table);

        // Every tool now fails: only the cache can reproduce the table.
        for name in ["mutate.sh", "cc.sh", "perf.sh", "gus.sh"] {
            fs::write(ws.tools.join(name), "exit 1\n").unwrap();
        }
        let summary = run(&ws.config).unwrap();
        assert_eq!(table_fields(&table), first);
        assert_eq!(summary.measurements.mutated.cached, 1);
        assert_eq!(summary.measurements.compiled.cached, 2);
    }

    #[test]
    fn test_simulation_is_gated_on_profiling() {
        let mut ws = workspace();
        ws.config.detect = Detection::default();
        fs::write(ws.tools.join("perf.sh"), "echo nothing useful\n").unwrap();

        let summary = run(&ws.config).unwrap();
        assert!(summary.measurements.simulated.is_empty());
        assert_eq!(summary.table.len(), 0);
        assert!(!ws.config.dirs.reports.join("bench0.cc.sim").exists());
    }

    #[test]
    fn test_simulation_without_profiler() {
        let mut ws = workspace();
        ws.config.stages.profile = false;
        ws.config.stages.sensitivity = false;
        ws.config.detect = Detection::default();

        let summary = run(&ws.config).unwrap();
        assert_eq!(summary.measurements.simulated.len(), 2);
        assert!(summary.errors.is_none());
        assert_eq!(
            table_fields(ws.config.table.as_ref().unwrap()),
            vec!["simulator cycles", "1100000", "600000"]
        );
    }

    #[test]
    fn test_failed_compilation_leaves_no_binary() {
        let mut ws = workspace();
        ws.config.detect = Detection::default();
        fs::write(ws.tools.join("cc.sh"), "exit 3\n").unwrap();

        let summary = run(&ws.config).unwrap();
        assert_eq!(summary.measurements.compiled.failed, 2);
        let profile = summary.measurements.profile.unwrap();
        assert!(profile.values().all(|r| !r.is_success()));
        assert_eq!(summary.table.len(), 0);
    }

    #[test]
    fn test_each_parallel_stage_has_its_own_pool() {
        let ws = workspace();
        let pipeline = Pipeline::new(&ws.config).unwrap();
        assert_eq!(pipeline.compile_pool.size(), 2);
        assert_eq!(pipeline.simulation_pool.size(), 2);
    }

    fn mutant(ws: &Workspace) -> Blueprint {
        let matrix = crate::matrix::Matrix::enumerate(&ws.config.matrix, &ws.config.dirs, "").unwrap();
        matrix.as_slice()[1].clone()
    }

    #[test]
    fn test_mutation_command_line() {
        let ws = workspace();
        let blueprint = mutant(&ws);
        let argv = mutation_invocation(&blueprint).unwrap().argv;
        let n = argv.len();
        assert_eq!(argv[n - 3], blueprint.source_original.to_string_lossy());
        assert_eq!(argv[n - 2], "-o");
        assert_eq!(argv[n - 1], blueprint.source.to_string_lossy());
        assert_eq!(mutate(&blueprint, false), StageOutcome::Done);
        assert_eq!(mutate(&blueprint, true), StageOutcome::Cached);
    }

    #[test]
    fn test_compile_command_line() {
        let ws = workspace();
        let blueprint = mutant(&ws);
        let options = CompileOptions {
            include_dirs: vec![PathBuf::from("/opt/polybench/utilities")],
            link_with: vec![PathBuf::from("polybench.c")],
            ..CompileOptions::default()
        };
        let argv = compile_invocation(&blueprint, &options).argv;
        let source_dir = blueprint.source_original.parent().unwrap().to_string_lossy().into_owned();
        let tail: Vec<&str> = argv[2..].iter().map(String::as_str).collect();
        assert_eq!(
            tail,
            vec![
                "-I",
                "/opt/polybench/utilities",
                "-I",
                source_dir.as_str(),
                blueprint.source.to_str().unwrap(),
                "polybench.c",
                "-o",
                blueprint.binary.to_str().unwrap(),
                "-lm",
            ]
        );
    }
}
