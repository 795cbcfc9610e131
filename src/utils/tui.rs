//! Text User Interface (TUI) utilities.
//!
//! Handles formatted output for the CLI. Diagnostics go through `log`; only
//! what the user asked to see is printed here.

use crate::pipeline::Summary;
use crate::report::Report;
use terminal_size::{terminal_size, Width};

/// Get the current terminal width, constrained to a reasonable range
fn get_term_width() -> usize {
    if let Some((Width(w), _)) = terminal_size() {
        (w as usize).clamp(40, 200)
    } else {
        80
    }
}

/// Truncate string with ellipsis if it exceeds width (character-wise)
fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut result: String = s.chars().take(width.saturating_sub(3)).collect();
        result.push_str("...");
        result
    }
}

/// Print the application header
pub fn print_header() {
    let term_width = get_term_width().min(80);
    let title = " Mutabench: differential backend checks ";
    let padding = term_width.saturating_sub(title.len() + 2) / 2;
    let right_padding = term_width.saturating_sub(padding + title.len());

    let border = "═".repeat(term_width);

    println!("╔{}╗", border);
    println!(
        "║{}{}{}║",
        " ".repeat(padding),
        title,
        " ".repeat(right_padding)
    );
    println!("╚{}╝", border);
    println!();
}

/// Print a stage banner
pub fn print_stage(name: &str, count: usize) {
    let line = format!("── {name} ({count} binaries) ");
    let fill = get_term_width().min(80).saturating_sub(line.chars().count());
    println!("{}{}", line, "─".repeat(fill));
}

/// Lines of the verbose dump of a report.
pub fn report_lines(report: &Report) -> Vec<String> {
    let mut lines = vec![format!("> {} ({})", report.stage(), report.binary().display())];
    match report {
        Report::Failed { .. } => lines.push("  Failed".to_string()),
        Report::Measured {
            bottlenecks,
            metrics,
            ..
        } => {
            lines.push("  Bottlenecks:".to_string());
            if bottlenecks.is_empty() {
                lines.push("    (none)".to_string());
            }
            lines.extend(bottlenecks.iter().map(|b| format!("    {b}")));
            lines.push("  Metrics:".to_string());
            lines.extend(metrics.iter().map(|(name, value)| format!("    {name:<28} {value}")));
        }
    }
    lines
}

/// Dump a report
pub fn print_report(report: &Report) {
    for line in report_lines(report) {
        println!("{line}");
    }
}

fn summary_lines(summary: &Summary) -> Vec<String> {
    let measurements = &summary.measurements;
    let mut lines = vec![format!("Blueprints: {} ({} selected)", summary.blueprints, summary.selected)];
    if measurements.mutated.total() > 0 {
        let t = measurements.mutated;
        lines.push(format!("Mutated:    {} done, {} cached, {} failed", t.done, t.cached, t.failed));
    }
    if measurements.compiled.total() > 0 {
        let t = measurements.compiled;
        lines.push(format!("Compiled:   {} done, {} cached, {} failed", t.done, t.cached, t.failed));
    }
    let ok = |reports: &crate::pipeline::Reports| reports.values().filter(|r| r.is_success()).count();
    if let Some(profile) = &measurements.profile {
        lines.push(format!("Profiled:   {}/{}", ok(profile), profile.len()));
    }
    if let Some(simulator) = &measurements.simulator {
        lines.push(format!("Simulated:  {}/{}", ok(simulator), simulator.len()));
    }
    if let Some(flagged) = Summary::flagged(summary.profile_suspicious.as_ref()) {
        lines.push(format!("Suspicious (profiler):  {flagged}"));
    }
    if let Some(flagged) = Summary::flagged(summary.simulator_suspicious.as_ref()) {
        lines.push(format!("Suspicious (simulator): {flagged}"));
    }
    if let Some(errors) = &summary.errors {
        let show = |v: Option<f64>| v.map_or("n/a".to_string(), |v| v.to_string());
        lines.push(format!("Simulator MRE:        {} ({} pairs)", show(errors.mean()), errors.pairs()));
        lines.push(format!(
            "Simulator MRE lifted: {} ({} pairs)",
            show(errors.lifted_mean()),
            errors.lifted_pairs()
        ));
    }
    lines.push(format!("Table rows: {}", summary.table.len()));
    lines
}

/// Print the end-of-run box
pub fn print_summary(summary: &Summary) {
    let term_width = get_term_width();
    let max_content_width = term_width.saturating_sub(4).max(40);
    let lines = summary_lines(summary);

    let content_width = lines
        .iter()
        .map(|l| l.chars().count())
        .max()
        .unwrap_or(60)
        .min(max_content_width);
    let border = "─".repeat(content_width + 2);

    println!();
    println!("┌{}┐", border);
    for line in &lines {
        println!(
            "│ {:<width$} │",
            truncate(line, content_width),
            width = content_width
        );
    }
    println!("└{}┘", border);
}
