use anyhow::Result;

use crate::commands::CommandReport;
use crate::noaa::crawler::{ScanOutcome, ScanStats};
use crate::noaa::schedule::CancellationToken;
use crate::noaa::watcher::Indexer;

fn describe_stats(stats: &ScanStats, report: &mut CommandReport) {
    report.detail(format!("scan.sites={}", stats.sites));
    report.detail(format!("scan.cataloged={}", stats.cataloged));
    report.detail(format!("scan.already_known={}", stats.already_known));
    report.detail(format!("scan.invalid_metadata={}", stats.invalid_metadata));
    report.detail(format!("scan.missing_raw_image={}", stats.missing_raw_image));
    report.detail(format!("scan.stale_deleted={}", stats.stale_deleted));
    if stats.stale_delete_failed > 0 {
        report.detail(format!(
            "scan.stale_delete_failed={}",
            stats.stale_delete_failed
        ));
    }
    if stats.cancelled {
        report.detail("scan.cancelled=true");
    }
}

pub fn describe(outcome: &ScanOutcome, report: &mut CommandReport) {
    match outcome {
        ScanOutcome::Busy => report.detail("scan.skipped=previous scan still running"),
        ScanOutcome::Completed(stats) => describe_stats(stats, report),
        ScanOutcome::Aborted { stats, failures } => {
            describe_stats(stats, report);
            report.detail(format!("scan.sites_failed={}", stats.sites_failed));
            for failure in failures {
                let site = if failure.site.is_empty() {
                    "-"
                } else {
                    failure.site.as_str()
                };
                report.issue(format!(
                    "scan aborted for site {site} ({}): {:#}",
                    failure.code(),
                    failure.error
                ));
            }
        }
    }
}

pub fn run() -> Result<CommandReport> {
    let mut report = CommandReport::new("scan");
    let indexer = Indexer::load()?;
    report.detail(format!("catalog_file={}", indexer.catalog.path().display()));

    let outcome = indexer.scan_cycle(&CancellationToken::new())?;
    describe(&outcome, &mut report);
    report.detail(format!("scan.skip_listed={}", indexer.skip_listed()));
    report.detail(format!("catalog.records={}", indexer.catalog.get()?.len()));
    Ok(report)
}
