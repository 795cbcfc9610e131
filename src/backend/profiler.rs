//! Top-down counter profiler (TAM).
//!
//! Runs the binary under `perf stat`, or under DynamoRIO with the tma-scope
//! client when its install directory is known, and classifies the level-1
//! top-down counters against the published thresholds.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use log::debug;

use super::{Backend, CachePolicy};
use crate::config::ProfilerConfig;
use crate::matrix::{Blueprint, ReportKind};
use crate::report::{Report, Stage, CYCLES};
use crate::utils::extract::parse_int;
use crate::utils::process::Invocation;

pub const PROFILE_TIMEOUT: Duration = Duration::from_secs(300);

pub const SLOTS: &str = "slots";
pub const RETIRING: &str = "topdown-retiring";
pub const FE_BOUND: &str = "topdown-fe-bound";
pub const BE_BOUND: &str = "topdown-be-bound";
pub const BAD_SPEC: &str = "topdown-bad-spec";

/// Counters that must all be present in a profile.
pub const COUNTERS: [&str; 6] = [CYCLES, SLOTS, RETIRING, BE_BOUND, FE_BOUND, BAD_SPEC];

/// Percent of slots beyond which a counter is a bottleneck
/// (Intel VTune Profiler cookbook, 2023.0).
pub const THRESHOLDS: [(&str, f64); 4] = [
    (RETIRING, 70.0),
    (BE_BOUND, 40.0),
    (FE_BOUND, 10.0),
    (BAD_SPEC, 5.0),
];

const DYNAMORIO_DIR: &str = "DynamoRIO-Linux-10.93.20000";

pub struct Profiler {
    config: ProfilerConfig,
    cache: CachePolicy,
}

impl Profiler {
    pub fn new(config: &ProfilerConfig, cache: CachePolicy) -> Self {
        Self {
            config: config.clone(),
            cache,
        }
    }
}

impl Backend for Profiler {
    fn stage(&self) -> Stage {
        Stage::Profile
    }

    fn report_kind(&self) -> ReportKind {
        ReportKind::Profile
    }

    fn cache_policy(&self) -> CachePolicy {
        self.cache
    }

    fn timeout(&self) -> Duration {
        PROFILE_TIMEOUT
    }

    fn invocation(&self, blueprint: &Blueprint) -> Invocation {
        let binary = blueprint.binary.to_string_lossy();
        let mut invocation = match &self.config.tma_scope_dir {
            Some(dir) => Invocation::new(dir.join(DYNAMORIO_DIR).join("bin64/drrun").to_string_lossy())
                .arg("-c")
                .arg(dir.join("build/libtmascope.so").to_string_lossy())
                .arg("--")
                .arg(binary)
                .env("TMA_FUNCTION", blueprint.kernel.as_str())
                .env("TMA_OUTPUT_FILE", blueprint.profile_report.to_string_lossy())
                .env("TMA_LEVEL", "TopdownL1")
                .env("TMA_CORE", self.config.core.to_string()),
            None => Invocation::from_tokens(self.config.program.split_whitespace())
                .arg("stat")
                .arg(binary),
        };
        if let Some(lib) = &self.config.huge_pages {
            invocation = invocation.env("LD_PRELOAD", lib.to_string_lossy());
        }
        invocation
    }

    fn parse(&self, binary: &Path, text: &str) -> Report {
        classify(binary, text)
    }
}

/// Parse the level-1 counters of a profile and flag the bottlenecks.
///
/// Each `<counter>-percent` metric is the counter's share of the total slots,
/// rounded to two decimals; the threshold comparison uses the exact value.
pub fn classify(binary: &Path, text: &str) -> Report {
    let mut metrics = BTreeMap::new();
    for counter in COUNTERS {
        let pattern = format!("(.*){}", regex::escape(counter));
        match parse_int(&pattern, text) {
            Some(value) => metrics.insert(counter.to_string(), value as f64),
            None => {
                debug!("{counter} missing from the profile of {}", binary.display());
                return Report::failed(binary, Stage::Profile);
            }
        };
    }

    let slots = metrics[SLOTS];
    if slots <= 0.0 {
        return Report::failed(binary, Stage::Profile);
    }

    let mut bottlenecks = Vec::new();
    for (counter, threshold) in THRESHOLDS {
        let percent = metrics[counter] * 100.0 / slots;
        metrics.insert(format!("{counter}-percent"), (percent * 100.0).round() / 100.0);
        if percent >= threshold {
            debug!("{counter} is a bottleneck for {} ({percent:.2}% >= {threshold}%)", binary.display());
            bottlenecks.push(counter.to_string());
        }
    }

    Report::Measured {
        binary: binary.to_path_buf(),
        stage: Stage::Profile,
        bottlenecks,
        metrics,
        raw: text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn perf_output(cycles: u64, slots: u64, retiring: u64, fe: u64, be: u64, bad: u64) -> String {
        format!(
            " Performance counter stats for './gemm.gcc':\n\n\
             {cycles:>16}      cycles\n\
             {slots:>16}      slots\n\
             {retiring:>16}      topdown-retiring\n\
             {bad:>16}      topdown-bad-spec\n\
             {fe:>16}      topdown-fe-bound\n\
             {be:>16}      topdown-be-bound\n\n\
             \t0,512 seconds time elapsed\n"
        )
    }

    #[test]
    fn test_classify_thresholds() {
        // retiring 20%, fe 12%, be 65%, bad-spec 3%
        let text = perf_output(1_000_000, 1000, 200, 120, 650, 30);
        let report = classify(Path::new("gemm.gcc"), &text);

        assert_eq!(report.cycles(), Some(1_000_000.0));
        assert_eq!(report.metric("topdown-be-bound-percent"), Some(65.0));
        assert_eq!(
            report.bottlenecks().unwrap(),
            &[BE_BOUND.to_string(), FE_BOUND.to_string()]
        );
    }

    #[test]
    fn test_threshold_is_inclusive() {
        // be-bound exactly at 40%, bad-spec exactly at 5%
        let text = perf_output(10, 100, 10, 5, 40, 5);
        let report = classify(Path::new("a"), &text);
        let bottlenecks = report.bottlenecks().unwrap();
        assert!(bottlenecks.contains(&BE_BOUND.to_string()));
        assert!(bottlenecks.contains(&BAD_SPEC.to_string()));
        assert!(!bottlenecks.contains(&RETIRING.to_string()));
    }

    #[test]
    fn test_be_bound_below_threshold() {
        let text = perf_output(1_000_000, 100, 50, 5, 35, 1);
        let report = classify(Path::new("a"), &text);
        assert_eq!(report.metric("topdown-be-bound-percent"), Some(35.0));
        assert!(!report.bottlenecks().unwrap().contains(&BE_BOUND.to_string()));
    }

    #[test]
    fn test_missing_counter_fails() {
        let text = "      1,000      cycles\n      100      slots\n";
        assert!(!classify(Path::new("a"), text).is_success());
    }

    #[test]
    fn test_zero_slots_fails() {
        let text = perf_output(10, 0, 0, 0, 0, 0);
        assert!(!classify(Path::new("a"), &text).is_success());
    }

    fn blueprint() -> Blueprint {
        Blueprint {
            source_original: PathBuf::from("gemm.c"),
            original_binary: PathBuf::from("/b/gemm.gcc"),
            kernel: "kernel_gemm".to_string(),
            mutation: None,
            source: PathBuf::from("gemm.c"),
            compiler: "gcc".to_string(),
            compile_command: "gcc".to_string(),
            binary: PathBuf::from("/b/gemm.gcc"),
            profile_report: PathBuf::from("/r/gemm.gcc.profile"),
            sim_report: PathBuf::from("/r/gemm.gcc.sim"),
            sensitivity_report: PathBuf::from("/r/gemm.gcc.sim-sensitivity"),
        }
    }

    #[test]
    fn test_perf_invocation() {
        let profiler = Profiler::new(&ProfilerConfig::default(), CachePolicy::Refresh);
        let invocation = profiler.invocation(&blueprint());
        assert_eq!(invocation.to_string(), "perf stat /b/gemm.gcc");
    }

    #[test]
    fn test_tma_scope_invocation_with_huge_pages() {
        let config = ProfilerConfig {
            tma_scope_dir: Some(PathBuf::from("/opt/tma")),
            core: 3,
            huge_pages: Some(PathBuf::from("libhugetlbfs.so")),
            ..ProfilerConfig::default()
        };
        let invocation = Profiler::new(&config, CachePolicy::Refresh).invocation(&blueprint());
        assert_eq!(
            invocation.argv,
            vec![
                "/opt/tma/DynamoRIO-Linux-10.93.20000/bin64/drrun",
                "-c",
                "/opt/tma/build/libtmascope.so",
                "--",
                "/b/gemm.gcc"
            ]
        );
        assert!(invocation.env.contains(&("TMA_FUNCTION".to_string(), "kernel_gemm".to_string())));
        assert!(invocation.env.contains(&("TMA_CORE".to_string(), "3".to_string())));
        assert!(invocation.env.contains(&("LD_PRELOAD".to_string(), "libhugetlbfs.so".to_string())));
    }
}
