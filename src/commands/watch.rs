use anyhow::Result;

use crate::commands::{CommandReport, forecast, scan};
use crate::noaa::schedule::CancellationToken;
use crate::noaa::watcher::Indexer;

#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    pub once: bool,
    pub daemon: bool,
}

pub fn run(opts: &WatchOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("watch");

    if opts.once == opts.daemon {
        report.issue("invalid flags: use exactly one of --once or --daemon");
        return Ok(report);
    }

    let indexer = Indexer::load()?;
    report.detail(format!("scan_interval_secs={}", indexer.config.scan.interval_secs));
    report.detail(format!(
        "forecast_interval_secs={}",
        indexer.config.forecast.interval_secs
    ));

    if opts.daemon {
        report.detail(format!(
            "daemon_lock={}",
            indexer.paths.daemon_lock_file().display()
        ));
        indexer.run_daemon()?;
        report.detail("daemon stopped");
        return Ok(report);
    }

    let cancel = CancellationToken::new();
    let mut scan_report = CommandReport::new("scan");
    scan::describe(&indexer.scan_cycle(&cancel)?, &mut scan_report);
    report.merge(scan_report);

    // A failed scan does not hold back the forecast.
    let mut forecast_report = CommandReport::new("forecast");
    forecast::describe(&indexer.forecast_cycle(&cancel)?, &mut forecast_report);
    report.merge(forecast_report);
    Ok(report)
}
