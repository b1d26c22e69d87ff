//! End-of-run report
//!
//! Turns a [`RunOutcome`] into the text the CLI prints: per-category crawl
//! results, extraction counts and, when the run stopped early, how to pick
//! it up again.

use crate::crawler::CrawlSummary;
use crate::extract::ExtractionReport;
use crate::service::{Job, RunOutcome};

/// Failed URLs listed in full before the list is truncated
const MAX_LISTED_ERRORS: usize = 10;

/// Formats the report for a finished job
pub fn format_outcome(outcome: &RunOutcome) -> String {
    let mut out = String::new();

    out.push_str(&format!("=== {} finished ===\n\n", outcome.job.name()));

    if !outcome.synced.is_empty() && matches!(outcome.job, Job::Sync) {
        out.push_str(&format!("Categories ready ({}):\n", outcome.synced.len()));
        for name in &outcome.synced {
            out.push_str(&format!("  - {}\n", name));
        }
        out.push('\n');
    }

    if !outcome.crawl.is_empty() {
        out.push_str("Crawl:\n");
        for summary in &outcome.crawl {
            out.push_str(&format_crawl_summary(summary));
        }
        out.push('\n');
    }

    if let Some(report) = &outcome.extraction {
        out.push_str(&format_extraction_report(report));
        out.push('\n');
    }

    if outcome.interrupted {
        out.push_str(&interrupted_notice(outcome.job));
    }

    out
}

fn format_crawl_summary(summary: &CrawlSummary) -> String {
    let state = if summary.quota_reached {
        "quota reached"
    } else if summary.interrupted {
        "interrupted"
    } else {
        "sources exhausted"
    };

    let mut out = format!(
        "  {}: {} URLs ({} new, {})\n",
        summary.category, summary.collected, summary.added, state
    );

    for (source, added) in &summary.per_source {
        out.push_str(&format!("    {:<28} +{}\n", source, added));
    }
    for (source, error) in &summary.source_errors {
        out.push_str(&format!("    {} unavailable: {}\n", source, error));
    }

    out
}

fn format_extraction_report(report: &ExtractionReport) -> String {
    let mut out = String::from("Extraction:\n");

    out.push_str(&format!(
        "  success: {}  failed: {}  skipped: {}  retried: {}\n",
        report.success, report.failed, report.skipped, report.retried
    ));

    for (category, counts) in &report.per_category {
        out.push_str(&format!(
            "    {:<20} queued {:>6}  success {:>6}  failed {:>6}  skipped {:>6}\n",
            category, counts.queued, counts.success, counts.failed, counts.skipped
        ));
    }

    if report.checkpoint_recovered {
        out.push_str("  Warning: the checkpoint file was unreadable; it was set aside and every URL was treated as pending\n");
    }

    if !report.errors.is_empty() {
        out.push_str(&format!("  Failed URLs ({}):\n", report.errors.len()));
        for (url, error) in report.errors.iter().take(MAX_LISTED_ERRORS) {
            out.push_str(&format!("    {}: {}\n", url, error));
        }
        if report.errors.len() > MAX_LISTED_ERRORS {
            out.push_str(&format!(
                "    ... and {} more\n",
                report.errors.len() - MAX_LISTED_ERRORS
            ));
        }
    }

    out
}

fn interrupted_notice(job: Job) -> String {
    let how = match job {
        Job::Crawl { .. } => "re-run `crawl --resume` to collect the remaining URLs",
        Job::Extract { .. } => "re-run `extract` to continue with the unfinished URLs",
        Job::All { .. } => "re-run `all --resume` to continue",
        Job::Sync => "re-run `sync`",
    };
    format!("Interrupted: progress was checkpointed; {}.\n", how)
}

/// Prints the report for a finished job to stdout
pub fn print_outcome(outcome: &RunOutcome) {
    print!("{}", format_outcome(outcome));
}
