//! Terminal rendering of matches, diffs, and journal records.
//!
//! This module is separate from the engine so morfx can be used as a
//! library without printing side effects.

use std::path::Path;

use colored::Colorize;
use unicode_width::UnicodeWidthStr;

use crate::engine::TransformOutcome;
use crate::journal::{KeyRow, LogEntry, RunRow};
use crate::journal::summary::RunSummary;
use crate::query::QueryMatch;
use crate::rewrite::ConfidenceLevel;

/// Success mark for consistent output formatting
pub const SUCCESS_MARK: &str = "\u{2713}"; // ✓
/// Failure mark for consistent output formatting
pub const FAILURE_MARK: &str = "\u{2718}"; // ✘

pub fn print_file_header(path: &Path) {
    println!("{}", path.display().to_string().bold());
}

/// Print matches as `N. <kind> '<name>' at line L:C`, continuing the
/// numbering from `start_index`; returns the next index.
pub fn print_matches(matches: &[QueryMatch], start_index: usize, verbose: bool) -> usize {
    let name_width = matches
        .iter()
        .map(|m| UnicodeWidthStr::width(m.name.as_str()))
        .max()
        .unwrap_or(0);

    let mut index = start_index;
    for m in matches {
        println!(
            "{index}. {} '{}' at line {}:{}",
            m.kind.cyan(),
            m.name.bold(),
            m.location.start_line,
            m.location.start_col,
        );
        if verbose {
            let first_line = m.content.lines().next().unwrap_or("");
            let padding = name_width.saturating_sub(UnicodeWidthStr::width(m.name.as_str()));
            let visibility = if m.exported { "exported" } else { "private " };
            println!(
                "   {}{:padding$} {}",
                visibility.dimmed(),
                "",
                first_line.dimmed(),
            );
        }
        index += 1;
    }
    index
}

pub fn print_transform(outcome: &TransformOutcome) {
    if !outcome.diff.is_empty() {
        print_diff(&outcome.diff);
    }

    let level = outcome.confidence.level();
    let level_str = match level {
        ConfidenceLevel::High => level.as_str().green(),
        ConfidenceLevel::Medium => level.as_str().yellow(),
        ConfidenceLevel::Low => level.as_str().red(),
    };
    println!(
        "confidence: {:.2} ({level_str}), {} target(s)",
        outcome.confidence.score, outcome.matches
    );
    for factor in &outcome.confidence.factors {
        println!("  {:+.2} {}", factor.delta, factor.reason.dimmed());
    }

    if outcome.dry_run {
        println!("{} dry run; {} not modified", "-".yellow(), outcome.path.display());
    } else if let Some(op_id) = &outcome.op_id {
        println!(
            "{} {} modified (operation {})",
            SUCCESS_MARK.green(),
            outcome.path.display(),
            op_id.dimmed()
        );
    }
}

pub fn print_diff(diff: &str) {
    for line in diff.lines() {
        if line.starts_with("+++") || line.starts_with("---") {
            println!("{}", line.bold());
        } else if line.starts_with('+') {
            println!("{}", line.green());
        } else if line.starts_with('-') {
            println!("{}", line.red());
        } else if line.starts_with("@@") {
            println!("{}", line.cyan());
        } else {
            println!("{line}");
        }
    }
}

pub fn print_rollback(report: &crate::apply::RollbackReport) {
    if report.reverted_operations == 0 {
        println!("nothing to roll back");
        return;
    }
    let prefix = if report.dry_run {
        "would revert".to_string()
    } else {
        format!("{} reverted", SUCCESS_MARK.green())
    };
    println!(
        "{prefix} {} operation(s) across {} file write(s)",
        report.reverted_operations,
        report.reverted_files.len()
    );
    for warning in &report.warnings {
        println!("{} {}", FAILURE_MARK.yellow(), warning);
    }
}

pub fn print_runs(runs: &[RunRow]) {
    for run in runs {
        let status = match run.status.as_str() {
            "completed" => run.status.green(),
            "archived" => run.status.dimmed(),
            _ => run.status.yellow(),
        };
        println!(
            "{}  {}  {} op(s)  started {}",
            run.public_id.bold(),
            status,
            run.next_op_seq,
            run.started_at,
        );
    }
}

pub fn print_summary(summary: &RunSummary) {
    println!("run {} ({})", summary.public_id.bold(), summary.status);
    println!(
        "  operations: {}  bytes: +{} -{}  tracked file bytes: {}",
        summary.op_count, summary.bytes_added, summary.bytes_removed, summary.file_bytes
    );
    println!(
        "  safe changes: {:.1}%  guardrail hits: {:.1}%",
        summary.safe_change_percent, summary.guardrail_pass_rate
    );
    if let Some(duration) = summary.duration_ms {
        println!("  duration: {duration}ms");
    }
    if !summary.ops_by_kind.is_empty() {
        println!("  by kind:");
        for op in &summary.ops_by_kind {
            println!("    {} {}", op.count, op.kind);
        }
    }
    if !summary.top_diagnostic_files.is_empty() {
        println!("  files with diagnostics:");
        for file in &summary.top_diagnostic_files {
            println!("    {} {}", file.issues, file.path.yellow());
        }
    }
}

pub fn print_keys(keys: &[KeyRow]) {
    for key in keys {
        let marker = if key.is_active {
            "active".green()
        } else {
            "      ".normal()
        };
        println!("v{}  {}  {}  created {}", key.version, key.algo, marker, key.created_at);
    }
}

pub fn print_logs(entries: &[LogEntry]) {
    for entry in entries {
        let level = match entry.level.as_str() {
            "error" => entry.level.red(),
            "warn" | "warning" => entry.level.yellow(),
            _ => entry.level.dimmed(),
        };
        println!("{} [{level}] {}", entry.ts, entry.text);
    }
}
