use crate::error::{ErrorCode, RemoteError};
use crate::noaa::catalog::CatalogStore;
use crate::noaa::enhancement::{self, ImageOracle, derived_file_name};
use crate::noaa::metadata::{self, MetadataError};
use crate::noaa::model::{EnhancementTypes, SatellitePass, ThumbnailSource, parse_file_key};
use crate::noaa::schedule::CancellationToken;
use crate::noaa::thumbnail;
use crate::noaa::warn::{self, WarnEvent};
use crate::remote::{self, RemoteEntry, RemoteFileStore};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError, TryLockError};
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub sites: usize,
    pub cataloged: usize,
    pub already_known: usize,
    pub invalid_metadata: usize,
    pub missing_raw_image: usize,
    pub stale_deleted: usize,
    pub stale_delete_failed: usize,
    pub sites_failed: usize,
    pub cancelled: bool,
}

impl ScanStats {
    pub fn summary(&self) -> String {
        format!(
            "sites={} sites_failed={} cataloged={} already_known={} invalid_metadata={} missing_raw_image={} stale_deleted={} stale_delete_failed={} cancelled={}",
            self.sites,
            self.sites_failed,
            self.cataloged,
            self.already_known,
            self.invalid_metadata,
            self.missing_raw_image,
            self.stale_deleted,
            self.stale_delete_failed,
            self.cancelled
        )
    }
}

/// A site whose scan stopped on an unexpected error.
#[derive(Debug)]
pub struct SiteFailure {
    pub site: String,
    pub error: anyhow::Error,
}

impl SiteFailure {
    pub fn code(&self) -> &'static str {
        ErrorCode::classify(&self.error).map_or("unclassified", ErrorCode::as_str)
    }
}

#[derive(Debug)]
pub enum ScanOutcome {
    /// A scan was already in progress; this trigger was dropped.
    Busy,
    Completed(ScanStats),
    /// At least one site stopped early. The remaining sites were still scanned, and the
    /// next cycle resumes each failed site where it stopped.
    Aborted {
        stats: ScanStats,
        failures: Vec<SiteFailure>,
    },
}

/// Existence checks against the month's image directory, one remote stat per query.
struct RemoteImageOracle<'a> {
    remote: &'a dyn RemoteFileStore,
    image_dir: &'a str,
}

impl ImageOracle for RemoteImageOracle<'_> {
    fn exists(&self, file_name: &str) -> Result<bool, RemoteError> {
        Ok(self
            .remote
            .stat(&remote::join(self.image_dir, &[file_name]))?
            .exists)
    }
}

fn sorted_names(entries: Vec<RemoteEntry>, directories: bool) -> Vec<String> {
    let mut names = entries
        .into_iter()
        .filter(|entry| entry.is_directory == directories)
        .map(|entry| entry.name)
        .collect::<Vec<_>>();
    names.sort();
    names
}

pub struct PassCrawler {
    remote: Arc<dyn RemoteFileStore>,
    catalog: Arc<CatalogStore>,
    sites: Vec<String>,
    skip_list: Mutex<HashSet<(String, String)>>,
    guard: Mutex<()>,
}

impl PassCrawler {
    pub fn new(remote: Arc<dyn RemoteFileStore>, catalog: Arc<CatalogStore>, sites: Vec<String>) -> Self {
        Self {
            remote,
            catalog,
            sites,
            skip_list: Mutex::new(HashSet::new()),
            guard: Mutex::new(()),
        }
    }

    pub fn skip_listed(&self) -> usize {
        self.skip_list
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn is_skip_listed(&self, site: &str, file_key: &str) -> bool {
        self.skip_list
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&(site.to_string(), file_key.to_string()))
    }

    fn skip(&self, site: &str, file_key: &str, err: &MetadataError) {
        warn::emit(&WarnEvent {
            site,
            file_key,
            reason: "metadata invalid",
            err: &err.to_string(),
            ..WarnEvent::new(ErrorCode::E003InvalidMetadata, "scan", "skip-list")
        });
        self.skip_list
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((site.to_string(), file_key.to_string()));
    }

    /// Runs one full scan over every site unless a scan is already running.
    pub fn scan(&self, cancel: &CancellationToken) -> ScanOutcome {
        let _running = match self.guard.try_lock() {
            Ok(held) => held,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                info!("pass scan already running; trigger dropped");
                return ScanOutcome::Busy;
            }
        };

        let mut stats = ScanStats::default();
        let mut failures = Vec::new();
        for site in &self.sites {
            if let Err(error) = self.scan_site(site, cancel, &mut stats) {
                stats.sites_failed += 1;
                failures.push(SiteFailure {
                    site: site.clone(),
                    error,
                });
            }
        }
        info!("scan done: {}", stats.summary());
        if failures.is_empty() {
            ScanOutcome::Completed(stats)
        } else {
            ScanOutcome::Aborted { stats, failures }
        }
    }

    fn scan_site(&self, site: &str, cancel: &CancellationToken, stats: &mut ScanStats) -> Result<()> {
        if cancel.is_cancelled() {
            stats.cancelled = true;
            return Ok(());
        }
        info!(site, "starting pass scan");
        stats.sites += 1;

        let base = remote::site_base(site);
        let mut known = self
            .catalog
            .site_keys(site)
            .context("failed to load cataloged passes")?;
        let failed = || format!("pass scan failed for site `{site}`");

        let years = self
            .remote
            .list_directory(&remote::join(&base, &["meta"]))
            .with_context(failed)?;
        for year in sorted_names(years, true) {
            if cancel.is_cancelled() {
                stats.cancelled = true;
                return Ok(());
            }
            let months = self
                .remote
                .list_directory(&remote::join(&base, &["meta", &year]))
                .with_context(failed)?;
            for month in sorted_names(months, true) {
                if cancel.is_cancelled() {
                    stats.cancelled = true;
                    return Ok(());
                }
                info!(site, month = %format!("{year}-{month}"), "scanning month");
                let meta_dir = remote::join(&base, &["meta", &year, &month]);
                let image_dir = remote::join(&base, &["images", &year, &month]);
                let files = self.remote.list_directory(&meta_dir).with_context(failed)?;
                for name in sorted_names(files, false) {
                    if cancel.is_cancelled() {
                        stats.cancelled = true;
                        return Ok(());
                    }
                    let file_key = remote::file_stem(&name).to_string();
                    if known.contains(&file_key) {
                        stats.already_known += 1;
                        continue;
                    }
                    if self.is_skip_listed(site, &file_key) {
                        continue;
                    }

                    let meta_path = remote::join(&meta_dir, &[&name]);
                    let cataloged = self
                        .scan_pass(site, &file_key, &meta_path, &image_dir, stats)
                        .with_context(|| format!("failed to catalog `{file_key}`"))
                        .with_context(failed)?;
                    if cataloged {
                        known.insert(file_key);
                    }
                }
            }
        }
        Ok(())
    }

    /// Returns whether the pass was appended to the catalog.
    fn scan_pass(
        &self,
        site: &str,
        file_key: &str,
        meta_path: &str,
        image_dir: &str,
        stats: &mut ScanStats,
    ) -> Result<bool> {
        info!(site, file_key, "scanning pass");

        let (start_time, satellite_name) = match parse_file_key(file_key) {
            Ok(parsed) => parsed,
            Err(err) => {
                self.skip(site, file_key, &err);
                stats.invalid_metadata += 1;
                return Ok(false);
            }
        };

        let raw_path = remote::join(image_dir, &[&derived_file_name(file_key, "RAW")]);
        if !self.remote.stat(&raw_path)?.exists {
            info!(
                site,
                file_key,
                code = ErrorCode::E004MissingRawImage.as_str(),
                "no raw image yet"
            );
            stats.missing_raw_image += 1;
            return Ok(false);
        }

        let text = self.remote.read_to_end(meta_path)?;
        let meta = match metadata::parse(&String::from_utf8_lossy(&text)) {
            Ok(meta) => meta,
            Err(err) => {
                self.skip(site, file_key, &err);
                stats.invalid_metadata += 1;
                return Ok(false);
            }
        };

        let oracle = RemoteImageOracle {
            remote: self.remote.as_ref(),
            image_dir,
        };
        let inferred = enhancement::infer(file_key, &meta.channel_a, &meta.channel_b, &oracle)?;
        for stale in &inferred.stale_files {
            let path = remote::join(image_dir, &[stale]);
            match self.remote.delete_file(&path) {
                Ok(true) => {
                    info!(site, file_key, path = path.as_str(), "deleted stale derived image");
                    stats.stale_deleted += 1;
                }
                Ok(false) => {}
                Err(err) => {
                    stats.stale_delete_failed += 1;
                    warn::emit(&WarnEvent {
                        site,
                        file_key,
                        reason: stale,
                        err: &err.to_string(),
                        ..WarnEvent::new(ErrorCode::E002RemoteUnavailable, "scan", "delete-stale")
                    });
                }
            }
        }

        let mut source = (ThumbnailSource::Raw, raw_path);
        if inferred.enhancements.contains(EnhancementTypes::MSA) {
            let msa_path = remote::join(image_dir, &[&derived_file_name(file_key, "MSA")]);
            if self.remote.stat(&msa_path)?.exists {
                source = (ThumbnailSource::Msa, msa_path);
            }
        }
        let (thumbnail_source, thumbnail_path) = source;
        let reader = self.remote.open_read(&thumbnail_path)?;
        let thumbnail_uri = thumbnail::generate(reader)
            .with_context(|| format!("failed to build thumbnail from `{thumbnail_path}`"))?;

        let pass = SatellitePass {
            site: site.to_string(),
            file_key: file_key.to_string(),
            start_time,
            end_time: meta.end_time,
            satellite_name,
            channel_a: meta.channel_a,
            channel_b: meta.channel_b,
            max_elevation: meta.max_elevation,
            gain: meta.gain,
            enhancement_types: inferred.enhancements,
            projection_types: inferred.projections,
            thumbnail_uri,
            thumbnail_enhancement_type: thumbnail_source,
            image_dir: image_dir.to_string(),
        };
        if self.catalog.insert(pass)? {
            info!(site, file_key, "pass cataloged");
            stats.cataloged += 1;
            Ok(true)
        } else {
            stats.already_known += 1;
            Ok(true)
        }
    }
}
