//! Output module for run summaries and statistics
//!
//! This module handles:
//! - Per-stage status counts read from the task store
//! - End-of-run summaries of what the workers did

pub mod stats;

pub use stats::{load_statistics, print_statistics, PipelineStatistics};

use crate::crawler::PoolReport;

/// Prints what the worker pool did during this run
pub fn print_run_summary(report: &PoolReport) {
    println!("=== Run Summary ===\n");

    for (stage, tally) in report.totals() {
        println!(
            "  {}: {} done, {} failed, {} locked, {} discovered",
            stage, tally.done, tally.failed, tally.locked, tally.discovered
        );
    }

    if report.interrupted() {
        println!("\nRun interrupted before all stages were drained.");
    }

    if !report.failures.is_empty() {
        println!("\nWorker failures ({}):", report.failures.len());
        for failure in &report.failures {
            println!("  - {}: {}", failure.worker, failure.error);
        }
    }
    println!();
}
