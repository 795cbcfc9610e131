//! Differential anomaly detection.
//!
//! A backend reporting a bottleneck that got *worse* in a mutant that runs
//! clearly faster than its original is probably mis-measuring something.
//! Every such case gets an evidence bundle in the reports directory.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{info, warn};

use crate::error::Result;
use crate::matrix::{Blueprint, Matrix, ReportKind};
use crate::report::Report;

/// A mutant must beat its original by more than `original / MARGIN_FRACTION`
/// cycles to count as improved.
pub const MARGIN_FRACTION: f64 = 5.0;

/// Whether `mutant_cycles` is faster than `original_cycles` beyond the
/// noise margin.
pub fn is_improvement(original_cycles: f64, mutant_cycles: f64) -> bool {
    let margin = (original_cycles / MARGIN_FRACTION).trunc();
    mutant_cycles + margin < original_cycles
}

/// Bottlenecks of `original` that are more saturated in `mutant`.
///
/// `None` when the two reports cannot be compared (a failure or a missing
/// cycle count on either side).
pub fn suspicious_bottlenecks_of(original: &Report, mutant: &Report) -> Option<Vec<String>> {
    let original_cycles = original.cycles()?;
    let mutant_cycles = mutant.cycles()?;
    let bottlenecks = original.bottlenecks()?;
    mutant.bottlenecks()?;

    if !is_improvement(original_cycles, mutant_cycles) {
        return Some(Vec::new());
    }
    Some(
        bottlenecks
            .iter()
            .filter(|counter| match (original.metric(counter), mutant.metric(counter)) {
                (Some(before), Some(after)) => after > before,
                _ => false,
            })
            .cloned()
            .collect(),
    )
}

/// Compare every selected blueprint with its original.
///
/// The result maps each compared binary to its suspicious counters, in the
/// order the original reports them (possibly none). Binaries that could not
/// be compared are absent.
pub fn find_suspicious_bottlenecks(
    selection: &[&Blueprint],
    matrix: &Matrix,
    reports: &HashMap<PathBuf, Report>,
    bundle_dir: &Path,
) -> Result<BTreeMap<PathBuf, Vec<String>>> {
    let mut suspicious = BTreeMap::new();
    for blueprint in selection {
        let original = matrix.original_of(blueprint)?;
        let (Some(mutant_report), Some(original_report)) =
            (reports.get(&blueprint.binary), reports.get(&original.binary))
        else {
            continue;
        };
        let Some(counters) = suspicious_bottlenecks_of(original_report, mutant_report) else {
            continue;
        };
        if !counters.is_empty() {
            info!("{}: suspicious {}", blueprint.name(), counters.join(", "));
            match write_bundle(bundle_dir, blueprint, original, &counters) {
                Ok(dir) => info!("evidence stored in {}", dir.display()),
                Err(e) => warn!("cannot store the evidence for {}: {e}", blueprint.name()),
            }
        }
        suspicious.insert(blueprint.binary.clone(), counters);
    }
    Ok(suspicious)
}

/// Create `<binary>-<c1+c2>-<timestamp>` under `parent`, adding a numeric
/// suffix if the name is taken.
fn create_bundle_dir(parent: &Path, binary_name: &str, counters: &[String]) -> io::Result<PathBuf> {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| format!("{}.{:09}", d.as_secs(), d.subsec_nanos()))
        .unwrap_or_else(|_| "0".to_string());
    let counters: Vec<String> = counters
        .iter()
        .map(|counter| counter.replace(std::path::is_separator, "_"))
        .collect();
    let base = format!("{binary_name}-{}-{stamp}", counters.join("+"));

    let mut attempt = 0;
    loop {
        let name = if attempt == 0 {
            base.clone()
        } else {
            format!("{base}-{attempt}")
        };
        let dir = parent.join(name);
        match fs::create_dir(&dir) {
            Ok(()) => return Ok(dir),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(e),
        }
    }
}

/// Copy the sources, binaries and existing reports of both blueprints.
/// Files that cannot be copied are logged and skipped.
fn write_bundle(parent: &Path, mutant: &Blueprint, original: &Blueprint, counters: &[String]) -> io::Result<PathBuf> {
    let dir = create_bundle_dir(parent, &mutant.name(), counters)?;

    let mut files: Vec<&Path> = vec![
        original.source.as_path(),
        mutant.source.as_path(),
        original.binary.as_path(),
        mutant.binary.as_path(),
    ];
    for kind in ReportKind::ALL {
        files.push(original.report_path(kind));
        files.push(mutant.report_path(kind));
    }

    for file in files {
        let Some(name) = file.file_name() else {
            continue;
        };
        let target = dir.join(name);
        if !file.exists() || target.exists() {
            continue;
        }
        if let Err(e) = fs::copy(file, &target) {
            warn!("cannot copy {} into {}: {e}", file.display(), dir.display());
        }
    }
    Ok(dir)
}
