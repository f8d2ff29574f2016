use anyhow::Result;
use std::env;

use crate::commands::CommandReport;
use crate::noaa::audit::read_events;
use crate::noaa::catalog::CatalogStore;
use crate::noaa::config::{load_config, resolve_config_path};
use crate::noaa::forecast::ForecastStore;
use crate::noaa::paths::resolve_paths;

include!(concat!(env!("OUT_DIR"), "/noaa_env_allowlist.rs"));

const ENV_PREFIX: &str = "NOAA_";

/// Prefixed variables in `keys` that nothing in this binary reads, sorted.
pub fn unknown_env_vars(keys: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut unknown = keys
        .into_iter()
        .filter(|key| key.starts_with(ENV_PREFIX))
        .filter(|key| !GENERATED_ENV_ALLOWLIST.contains(&key.as_str()))
        .collect::<Vec<_>>();
    unknown.sort();
    unknown
}

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let mut report = CommandReport::new("status");

    report.detail(format!("home={}", paths.home.display()));
    report.detail(format!("db_dir={}", paths.db_dir.display()));
    report.detail(format!("logs_dir={}", paths.logs_dir.display()));
    match resolve_config_path() {
        Some(path) if path.exists() => report.detail(format!("config_path={}", path.display())),
        Some(path) => report.detail(format!("config_path={} (not found, defaults)", path.display())),
        None => report.detail("config_path=<unresolved>"),
    }

    match load_config() {
        Ok(cfg) => {
            report.detail(format!("remote.base_uri={}", cfg.remote.base_uri));
            report.detail(format!(
                "remote.auth={}",
                if cfg.remote.user.is_some() { "basic" } else { "none" }
            ));
            report.detail(format!("remote.timeout_secs={}", cfg.remote.timeout_secs));
            report.detail(format!("sites={}", cfg.site_list().join(",")));
            report.detail(format!("scan.interval_secs={}", cfg.scan.interval_secs));
            report.detail(format!("forecast.interval_secs={}", cfg.forecast.interval_secs));
            report.detail(format!("forecast.source_file={}", cfg.forecast.source_file));
        }
        Err(err) => report.issue(format!("config invalid: {err:#}")),
    }

    let catalog = CatalogStore::open(paths.catalog_file());
    match catalog.get() {
        Ok(passes) => report.detail(format!("catalog.records={}", passes.len())),
        Err(err) => report.issue(format!("catalog unreadable: {err:#}")),
    }
    let forecast = ForecastStore::open(paths.forecast_file());
    match forecast.get() {
        Ok(passes) => report.detail(format!("forecast.records={}", passes.len())),
        Err(err) => report.issue(format!("forecast unreadable: {err:#}")),
    }

    match read_events(&paths) {
        Ok(events) => {
            for phase in ["scan", "forecast", "daemon"] {
                if let Some(event) = events.iter().rev().find(|e| e.phase == phase) {
                    report.detail(format!(
                        "last.{phase}={} at_epoch_secs={} {}",
                        event.status, event.at_epoch_secs, event.message
                    ));
                }
            }
        }
        Err(err) => report.issue(format!("audit log unreadable: {err:#}")),
    }

    for key in unknown_env_vars(env::vars().map(|(key, _)| key)) {
        report.issue(format!("unknown environment variable {key}"));
    }

    Ok(report)
}
