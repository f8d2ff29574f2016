use anyhow::Result;

use crate::commands::CommandReport;
use crate::error::ErrorCode;
use crate::noaa::forecast::ForecastOutcome;
use crate::noaa::schedule::CancellationToken;
use crate::noaa::watcher::Indexer;

pub fn describe(outcome: &ForecastOutcome, report: &mut CommandReport) {
    match outcome {
        ForecastOutcome::Busy => report.detail("forecast.skipped=previous refresh still running"),
        ForecastOutcome::Completed(stats) => {
            report.detail(format!("forecast.sites={}", stats.sites));
            report.detail(format!("forecast.refreshed={}", stats.refreshed));
            report.detail(format!("forecast.unchanged={}", stats.unchanged));
            report.detail(format!("forecast.missing={}", stats.missing));
            report.detail(format!("forecast.passes_loaded={}", stats.passes_loaded));
            report.detail(format!("forecast.skipped_lines={}", stats.skipped_lines));
            report.detail(format!("forecast.written={}", stats.written));
        }
        ForecastOutcome::Aborted { stats, error } => {
            report.detail(format!("forecast.partial {}", stats.summary()));
            let code = ErrorCode::classify(error).map_or("unclassified", ErrorCode::as_str);
            report.issue(format!("forecast refresh aborted ({code}): {error:#}"));
        }
    }
}

/// With `clear`, the store is emptied first so every site is reloaded from its source.
pub fn run(clear: bool) -> Result<CommandReport> {
    let mut report = CommandReport::new("forecast");
    let indexer = Indexer::load()?;
    report.detail(format!(
        "forecast_file={}",
        indexer.forecast.path().display()
    ));
    if clear {
        indexer.forecast.clear()?;
        report.detail("forecast.cleared=true");
    }

    let outcome = indexer.forecast_cycle(&CancellationToken::new())?;
    describe(&outcome, &mut report);
    report.detail(format!("forecast.records={}", indexer.forecast.get()?.len()));
    Ok(report)
}
