//! Run reporting
//!
//! Pure formatting of a [`RunReport`] into operator-facing text. No side
//! effects, no external calls.

use crate::models::RunReport;

/// One-line classification of how the run ended
pub fn headline(report: &RunReport) -> &'static str {
    if report.halted_by_rate_limit {
        "Run halted: provider rate limit reached"
    } else if report.halted_by_user {
        "Run stopped by operator"
    } else {
        "Run completed"
    }
}

/// Multi-line operator summary with counts
pub fn summarize(report: &RunReport) -> String {
    let mut summary = format!(
        "{}\nProcessed: {}\nSaved: {}\nWithout result: {}",
        headline(report),
        report.processed,
        report.succeeded,
        report.failed,
    );

    if report.halted_by_rate_limit {
        summary.push_str("\nThe provider throttled this run. Wait a few minutes and start again to continue.");
    } else if report.halted_by_user {
        summary.push_str("\nPartial results above; already saved items remain saved.");
    }

    summary
}
