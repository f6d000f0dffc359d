//! Console summary of a finished run.

use colored::Colorize;
use tender_extraction::{DownloadSummary, ExtractionOutcome, ExtractionReport, StatsSnapshot};

pub fn print_summary(report: &ExtractionReport, stats: &StatsSnapshot) {
    println!();
    println!("{}", "=".repeat(60));
    println!("{}", "Extraction Summary".bold());
    println!("{}", "=".repeat(60));

    for outcome in &report.outcomes {
        match outcome {
            ExtractionOutcome::Success(tender) => {
                println!();
                println!("{} {}", "✓".green(), tender.id.as_str().bold());
                println!("  Title:     {}", tender.title);
                println!("  Entity:    {}", tender.entity);
                println!("  Offers:    {}", tender.offers);
                println!("  Documents: {}", tender.documents.len());
                println!("  Source:    {}", tender.strategy);
            }
            ExtractionOutcome::Failure(failure) => {
                println!();
                println!("{} {}", "✗".red(), failure.identifier.bold());
                println!(
                    "  {} after {} attempt(s): {}",
                    failure.kind.as_str().yellow(),
                    failure.attempts,
                    failure.message
                );
            }
        }
    }

    println!();
    println!("{}", "-".repeat(60));
    println!(
        "{} succeeded, {} failed, {} total",
        report.success_count().to_string().green(),
        report.failure_count().to_string().red(),
        report.len()
    );
    for (kind, count) in report.failure_summary() {
        println!("  {kind}: {count}");
    }
    let by_entity = report.by_entity();
    if by_entity.len() > 1 {
        println!("by entity:");
        for (entity, tenders) in &by_entity {
            println!("  {entity}: {}", tenders.len());
        }
    }
    println!(
        "attempts: {} static, {} rendered ({} retries, {} fallbacks)",
        stats.static_attempts, stats.rendered_attempts, stats.retries, stats.fallbacks
    );
    if report.cancelled {
        println!("{}", "Run was cancelled before completion".yellow());
    }
}

pub fn print_downloads(downloads: &DownloadSummary) {
    println!(
        "documents: {} saved ({} bytes), {} failed",
        downloads.saved.len().to_string().green(),
        downloads.total_bytes(),
        downloads.failed.len().to_string().red()
    );
    for failed in &downloads.failed {
        println!("  {} {}: {}", failed.tender.bold(), failed.url, failed.error);
    }
}
