use anyhow::Result;

use crate::commands::CommandReport;
use crate::noaa::catalog::CatalogStore;
use crate::noaa::model::SatellitePass;
use crate::noaa::paths::resolve_paths;

#[derive(Debug, Clone, Default)]
pub struct PassesOptions {
    pub site: Option<String>,
    pub limit: Option<usize>,
}

fn render(pass: &SatellitePass) -> String {
    let end = pass
        .end_time
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "-".to_string());
    format!(
        "pass={} site={} satellite={} start={} end={} max_elevation={} gain={} channels={}/{} enhancements={} projections={} thumbnail={}",
        pass.file_key,
        if pass.site.is_empty() { "-" } else { pass.site.as_str() },
        pass.satellite_name,
        pass.start_time.to_rfc3339(),
        end,
        pass.max_elevation,
        pass.gain,
        pass.channel_a,
        pass.channel_b,
        pass.enhancement_types.bits(),
        pass.projection_types.bits(),
        pass.thumbnail_enhancement_type.suffix(),
    )
}

/// Catalog records in insertion order, so the newest pass is listed last.
pub fn select<'a>(passes: &'a [SatellitePass], opts: &PassesOptions) -> Vec<&'a SatellitePass> {
    let mut selected = passes
        .iter()
        .filter(|pass| opts.site.as_deref().is_none_or(|site| pass.site == site))
        .collect::<Vec<_>>();
    if let Some(limit) = opts.limit {
        let skip = selected.len().saturating_sub(limit);
        selected.drain(..skip);
    }
    selected
}

pub fn run(opts: &PassesOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("passes");
    let paths = resolve_paths()?;
    let catalog = CatalogStore::open(paths.catalog_file());
    report.detail(format!("catalog_file={}", catalog.path().display()));

    let passes = catalog.get()?;
    let selected = select(&passes, opts);
    report.detail(format!("catalog.records={}", passes.len()));
    report.detail(format!("selected={}", selected.len()));
    for pass in selected {
        report.detail(render(pass));
    }
    Ok(report)
}
