use anyhow::Result;

use crate::commands::CommandReport;
use crate::noaa::forecast::ForecastStore;
use crate::noaa::paths::resolve_paths;

pub fn run(site: Option<&str>) -> Result<CommandReport> {
    let mut report = CommandReport::new("upcoming");
    let paths = resolve_paths()?;
    let store = ForecastStore::open(paths.forecast_file());
    report.detail(format!("forecast_file={}", store.path().display()));

    let mut passes = store
        .get()?
        .into_iter()
        .filter(|pass| site.is_none_or(|site| pass.site == site))
        .collect::<Vec<_>>();
    passes.sort_by_key(|pass| pass.start_time);

    report.detail(format!("selected={}", passes.len()));
    for pass in passes {
        report.detail(format!(
            "upcoming site={} satellite={} start={} end={} max_elevation={}",
            if pass.site.is_empty() { "-" } else { pass.site.as_str() },
            pass.satellite_name,
            pass.start_time.to_rfc3339(),
            pass.end_time.to_rfc3339(),
            pass.max_elevation
        ));
    }
    Ok(report)
}
