use crate::noaa::model::UpcomingPass;
use crate::noaa::schedule::CancellationToken;
use crate::noaa::store::JsonArrayFile;
use crate::remote::{self, RemoteFileStore};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, TryLockError};
use tracing::{info, warn};

const UPCOMING_FIELDS: usize = 7;

/// Forecast table; each site's subset is replaced wholesale.
#[derive(Debug)]
pub struct ForecastStore {
    file: JsonArrayFile<UpcomingPass>,
}

impl ForecastStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            file: JsonArrayFile::new(path),
        }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn get(&self) -> Result<Vec<UpcomingPass>> {
        Ok(self.file.read_all()?.0)
    }

    /// Replaces the entries of every site in `by_site` with one rewrite.
    pub fn replace_sites(&self, by_site: BTreeMap<String, Vec<UpcomingPass>>) -> Result<()> {
        if by_site.is_empty() {
            return Ok(());
        }
        self.file.rewrite(|items| {
            items.retain(|pass| !by_site.contains_key(&pass.site));
            for (site, passes) in by_site {
                items.extend(passes.into_iter().map(|mut pass| {
                    pass.site = site.clone();
                    pass
                }));
            }
            (true, ())
        })?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.file.rewrite(|items| {
            items.clear();
            (true, ())
        })?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedForecast {
    pub passes: Vec<UpcomingPass>,
    pub skipped_lines: usize,
}

fn epoch(raw: &str) -> Option<DateTime<Utc>> {
    let secs = raw.trim().parse::<i64>().ok()?;
    DateTime::<Utc>::from_timestamp(secs, 0)
}

fn parse_line(site: &str, line: &str) -> Option<UpcomingPass> {
    let fields = line.split(',').collect::<Vec<_>>();
    if fields.len() != UPCOMING_FIELDS {
        return None;
    }
    Some(UpcomingPass {
        site: site.to_string(),
        start_time: epoch(fields[0])?,
        end_time: epoch(fields[1])?,
        max_elevation: fields[2].trim().parse::<i32>().ok()?,
        satellite_name: fields[4].replace(' ', ""),
    })
}

/// Parses an upcoming-passes source file: `start,end,max_elev,_,name,_,_` per line.
pub fn parse_upcoming(site: &str, text: &str) -> ParsedForecast {
    let mut out = ParsedForecast::default();
    for (idx, line) in text.lines().enumerate() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(site, line) {
            Some(pass) => out.passes.push(pass),
            None => {
                warn!(site, line = idx + 1, content = line, "skipping invalid upcoming pass line");
                out.skipped_lines += 1;
            }
        }
    }
    out
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ForecastStats {
    pub sites: usize,
    pub refreshed: usize,
    pub unchanged: usize,
    pub missing: usize,
    pub passes_loaded: usize,
    pub skipped_lines: usize,
    pub written: bool,
    pub cancelled: bool,
}

impl ForecastStats {
    pub fn summary(&self) -> String {
        format!(
            "sites={} refreshed={} unchanged={} missing={} passes_loaded={} skipped_lines={} written={} cancelled={}",
            self.sites,
            self.refreshed,
            self.unchanged,
            self.missing,
            self.passes_loaded,
            self.skipped_lines,
            self.written,
            self.cancelled
        )
    }
}

#[derive(Debug)]
pub enum ForecastOutcome {
    /// Another refresh was running; this trigger was dropped.
    Busy,
    Completed(ForecastStats),
    Aborted {
        stats: ForecastStats,
        error: anyhow::Error,
    },
}

/// Last-modified stamp of a site's source file as of the last successful read.
/// `None` means the file existed but reported no timestamp.
type SeenStamps = HashMap<String, Option<DateTime<Utc>>>;

pub struct ForecastRefresher {
    remote: Arc<dyn RemoteFileStore>,
    store: Arc<ForecastStore>,
    sites: Vec<String>,
    source_file: String,
    seen: Mutex<SeenStamps>,
    guard: Mutex<()>,
}

impl ForecastRefresher {
    pub fn new(
        remote: Arc<dyn RemoteFileStore>,
        store: Arc<ForecastStore>,
        sites: Vec<String>,
        source_file: impl Into<String>,
    ) -> Self {
        Self {
            remote,
            store,
            sites,
            source_file: source_file.into(),
            seen: Mutex::new(HashMap::new()),
            guard: Mutex::new(()),
        }
    }

    pub fn refresh(&self, cancel: &CancellationToken) -> ForecastOutcome {
        let _running = match self.guard.try_lock() {
            Ok(held) => held,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                info!("forecast refresh already running; trigger dropped");
                return ForecastOutcome::Busy;
            }
        };

        info!("starting upcoming pass refresh");
        let mut stats = ForecastStats::default();
        match self.refresh_sites(cancel, &mut stats) {
            Ok(()) => {
                info!("{}", stats.summary());
                ForecastOutcome::Completed(stats)
            }
            Err(error) => ForecastOutcome::Aborted { stats, error },
        }
    }

    fn refresh_sites(&self, cancel: &CancellationToken, stats: &mut ForecastStats) -> Result<()> {
        let known_sites = self
            .store
            .get()?
            .into_iter()
            .map(|pass| pass.site)
            .collect::<HashSet<_>>();
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);

        let mut replacements = BTreeMap::new();
        let mut pending_seen = Vec::new();
        for site in &self.sites {
            if cancel.is_cancelled() {
                stats.cancelled = true;
                break;
            }
            stats.sites += 1;

            let path = remote::join(&remote::site_base(site), &[&self.source_file]);
            let stat = self
                .remote
                .stat(&path)
                .with_context(|| format!("forecast refresh failed for site `{site}`"))?;

            if !stat.exists {
                warn!(site = site.as_str(), path = path.as_str(), "upcoming passes file does not exist");
                stats.missing += 1;
                if known_sites.contains(site) || seen.contains_key(site) {
                    replacements.insert(site.clone(), Vec::new());
                }
                pending_seen.push((site.clone(), None));
                continue;
            }

            if let (Some(current), Some(Some(previous))) = (stat.last_modified, seen.get(site)) {
                if current == *previous {
                    info!(site = site.as_str(), "upcoming passes file has not been modified");
                    stats.unchanged += 1;
                    continue;
                }
            }

            let bytes = self
                .remote
                .read_to_end(&path)
                .with_context(|| format!("forecast refresh failed for site `{site}`"))?;
            let parsed = parse_upcoming(site, &String::from_utf8_lossy(&bytes));
            stats.refreshed += 1;
            stats.passes_loaded += parsed.passes.len();
            stats.skipped_lines += parsed.skipped_lines;
            replacements.insert(site.clone(), parsed.passes);
            pending_seen.push((site.clone(), Some(stat.last_modified)));
        }

        if !replacements.is_empty() {
            self.store.replace_sites(replacements)?;
            stats.written = true;
        }

        // Stamps are only trusted once the data they describe is persisted.
        for (site, stamp) in pending_seen {
            match stamp {
                Some(stamp) => {
                    seen.insert(site, stamp);
                }
                None => {
                    seen.remove(&site);
                }
            }
        }
        Ok(())
    }
}
