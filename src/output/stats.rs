//! Human-readable run and state summaries
//!
//! Summaries go to stderr so stdout can carry JSON Lines records.

use crate::output::traits::RunSummary;
use crate::storage::StateStats;
use std::io::{self, Write};

/// Writes a run summary in a formatted manner
pub fn write_summary<W: Write>(out: &mut W, summary: &RunSummary) -> io::Result<()> {
    writeln!(out, "=== Harvest Summary ===\n")?;

    writeln!(out, "Overview:")?;
    writeln!(out, "  Records extracted: {}", summary.records)?;
    writeln!(out, "  Fetches dispatched: {}", summary.dispatched)?;
    writeln!(out, "  Fetches completed: {}", summary.completed)?;
    writeln!(out, "  Links queued: {}", summary.discovered)?;
    writeln!(out, "  Duplicates skipped: {}", summary.duplicates)?;
    writeln!(out, "  Beyond depth limit: {}", summary.beyond_depth)?;
    writeln!(out, "  Elapsed: {:.1}s", summary.elapsed.as_secs_f64())?;
    if summary.cancelled {
        writeln!(out, "  Run was cancelled")?;
    }
    writeln!(out)?;

    if summary.has_failures() {
        writeln!(out, "Failures ({}):", summary.failures.len())?;
        let mut counts: Vec<_> = summary.failure_counts().into_iter().collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        for (kind, count) in counts {
            writeln!(out, "  {}: {}", kind, count)?;
        }
        for failure in &summary.failures {
            writeln!(
                out,
                "  - {} [{}] {}",
                failure.target, failure.kind, failure.message
            )?;
        }
        writeln!(out)?;
    }

    if !summary.abandoned.is_empty() {
        writeln!(out, "Abandoned ({}):", summary.abandoned.len())?;
        for abandoned in &summary.abandoned {
            writeln!(out, "  - {} ({})", abandoned.target, abandoned.reason)?;
        }
        writeln!(out)?;
    }

    writeln!(
        out,
        "Success Rate: {:.1}% ({} / {} fetched pages produced a record)",
        summary.success_rate(),
        summary.records,
        summary.completed
    )
}

/// Prints a run summary to stderr
pub fn print_summary(summary: &RunSummary) {
    let stderr = io::stderr();
    if let Err(e) = write_summary(&mut stderr.lock(), summary) {
        tracing::warn!("Failed to print summary: {}", e);
    }
}

/// Prints persisted state statistics to stdout
pub fn print_state_stats(stats: &StateStats) {
    println!("=== Harvest State ===\n");
    println!("  Seen targets: {}", stats.seen);
    println!("  Frontier (pending): {}", stats.frontier);
    println!("  Runs recorded: {}", stats.runs);

    if let Some(run) = &stats.latest_run {
        println!();
        println!("Latest Run:");
        println!("  ID: {}", run.id);
        println!("  Status: {}", run.status.to_db_string());
        println!("  Started: {}", run.started_at);
        if let Some(finished) = &run.finished_at {
            println!("  Finished: {}", finished);
        }
        if let Some(records) = run.records {
            println!("  Records: {}", records);
        }
        if let Some(failures) = run.failures {
            println!("  Failures: {}", failures);
        }
        println!("  Config hash: {}", run.config_hash);
    }
}
