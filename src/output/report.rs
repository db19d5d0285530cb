//! Console summaries of harvests, checkpoints and merges

use crate::harvester::{HarvestOutcome, HarvestReport};
use crate::output::merge::MergeReport;
use crate::record::Field;
use crate::storage::Checkpoint;
use std::fmt::Write;

/// Renders a harvest report
pub fn format_report(report: &HarvestReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Harvest Report: {} ===\n", report.region);
    let _ = writeln!(out, "Outcome: {}", report.outcome);
    let _ = writeln!(out, "  Records collected: {}", report.records.len());
    let _ = writeln!(out, "  Last completed page: {}", report.last_completed_page);
    let _ = writeln!(out, "  Pages visited: {}", report.pages_visited);
    let _ = writeln!(out, "  Recoveries: {}", report.recoveries);

    match &report.output_path {
        Some(path) => {
            let _ = writeln!(out, "  Output: {}", path.display());
        }
        None => {
            let _ = writeln!(out, "  Output: none (no records)");
        }
    }

    if !report.records.is_empty() {
        let _ = writeln!(out, "\nField coverage:");
        for field in Field::ALL {
            let present = report
                .records
                .iter()
                .filter(|r| r.get(field).is_some_and(|v| !v.is_empty()))
                .count();
            let percentage = present as f64 / report.records.len() as f64 * 100.0;
            let _ = writeln!(out, "  {}: {} ({:.1}%)", field, present, percentage);
        }
    }

    if matches!(report.outcome, HarvestOutcome::Aborted(_)) {
        let _ = writeln!(
            out,
            "\nThe session stopped early; run again to resume from page {}.",
            report.last_completed_page + 1
        );
    }

    out
}

/// Prints a harvest report to stdout
pub fn print_report(report: &HarvestReport) {
    print!("{}", format_report(report));
}

/// Renders the stored checkpoint of a region
pub fn format_checkpoint(region: &str, checkpoint: Option<&Checkpoint>) -> String {
    let Some(checkpoint) = checkpoint else {
        return format!("No checkpoint for {}; the next run starts at page 1.\n", region);
    };

    let mut out = String::new();
    let _ = writeln!(out, "=== Checkpoint: {} ===\n", region);
    let _ = writeln!(out, "  Last completed page: {}", checkpoint.page_index);
    let _ = writeln!(out, "  Records: {}", checkpoint.records.len());
    let _ = writeln!(
        out,
        "  Saved at: {}",
        checkpoint.saved_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if let Some(hash) = &checkpoint.config_hash {
        let _ = writeln!(out, "  Config hash: {}", hash);
    }
    let _ = writeln!(out, "  Next run resumes at page {}", checkpoint.next_page());
    out
}

/// Prints the stored checkpoint of a region to stdout
pub fn print_checkpoint(region: &str, checkpoint: Option<&Checkpoint>) {
    print!("{}", format_checkpoint(region, checkpoint));
}

/// Prints a merge summary to stdout
pub fn print_merge_report(report: &MergeReport) {
    println!("=== Merge ===\n");
    println!("  Output: {}", report.output_path.display());
    println!("  Rows: {}", report.rows);
    println!("  Columns: {}", report.columns);
    println!("  Files read: {}", report.files_read);
    if !report.files_skipped.is_empty() {
        println!("  Files skipped ({}):", report.files_skipped.len());
        for path in &report.files_skipped {
            println!("    - {}", path.display());
        }
    }
}
