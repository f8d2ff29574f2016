use crate::error::ErrorCode;
use crate::noaa::audit;
use crate::noaa::catalog::CatalogStore;
use crate::noaa::config::{IndexConfig, load_config};
use crate::noaa::crawler::{PassCrawler, ScanOutcome};
use crate::noaa::daemon_lock::DaemonLock;
use crate::noaa::forecast::{ForecastOutcome, ForecastRefresher, ForecastStore};
use crate::noaa::paths::{IndexPaths, resolve_paths};
use crate::noaa::schedule::{CancellationToken, PeriodicJob, run_periodic};
use crate::remote;
use anyhow::{Context, Result};
use signal_hook::consts::{SIGINT, SIGTERM};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Both pipelines wired to one remote store and one db directory.
pub struct Indexer {
    pub paths: IndexPaths,
    pub config: IndexConfig,
    pub catalog: Arc<CatalogStore>,
    pub forecast: Arc<ForecastStore>,
    crawler: PassCrawler,
    refresher: ForecastRefresher,
}

fn outcome_code(error: &anyhow::Error) -> &'static str {
    ErrorCode::classify(error).map_or("unclassified", ErrorCode::as_str)
}

impl Indexer {
    pub fn load() -> Result<Self> {
        let paths = resolve_paths()?;
        let config = load_config()?;
        Self::new(paths, config)
    }

    pub fn new(paths: IndexPaths, config: IndexConfig) -> Result<Self> {
        let remote = remote::open_store(&config.remote).context("failed to open remote store")?;
        let catalog = Arc::new(CatalogStore::open(paths.catalog_file()));
        let forecast = Arc::new(ForecastStore::open(paths.forecast_file()));
        let sites = config.site_list();
        let crawler = PassCrawler::new(Arc::clone(&remote), Arc::clone(&catalog), sites.clone());
        let refresher = ForecastRefresher::new(
            remote,
            Arc::clone(&forecast),
            sites,
            config.forecast.source_file.clone(),
        );
        Ok(Self {
            paths,
            config,
            catalog,
            forecast,
            crawler,
            refresher,
        })
    }

    /// Passes this process has given up on because their metadata is invalid.
    pub fn skip_listed(&self) -> usize {
        self.crawler.skip_listed()
    }

    /// One crawl, recorded in the audit log whatever its outcome.
    pub fn scan_cycle(&self, cancel: &CancellationToken) -> Result<ScanOutcome> {
        let outcome = self.crawler.scan(cancel);
        match &outcome {
            ScanOutcome::Busy => {
                audit::append_event(&self.paths, "scan", "skipped", "previous scan still running")?
            }
            ScanOutcome::Completed(stats) => {
                audit::append_event(&self.paths, "scan", "ok", &stats.summary())?
            }
            ScanOutcome::Aborted { stats, failures } => {
                let mut message = stats.summary();
                for failure in failures {
                    error!(
                        site = failure.site.as_str(),
                        code = failure.code(),
                        "error while scanning: {:#}",
                        failure.error
                    );
                    message.push_str(&format!(
                        " failure[site={} code={} error={:#}]",
                        failure.site,
                        failure.code(),
                        failure.error
                    ));
                }
                audit::append_event(&self.paths, "scan", "error", &message)?
            }
        }
        Ok(outcome)
    }

    pub fn forecast_cycle(&self, cancel: &CancellationToken) -> Result<ForecastOutcome> {
        let outcome = self.refresher.refresh(cancel);
        match &outcome {
            ForecastOutcome::Busy => audit::append_event(
                &self.paths,
                "forecast",
                "skipped",
                "previous refresh still running",
            )?,
            ForecastOutcome::Completed(stats) => {
                audit::append_event(&self.paths, "forecast", "ok", &stats.summary())?
            }
            ForecastOutcome::Aborted { stats, error } => {
                error!(code = outcome_code(error), "error while refreshing forecast: {error:#}");
                audit::append_event(
                    &self.paths,
                    "forecast",
                    "error",
                    &format!("code={} {} error={error:#}", outcome_code(error), stats.summary()),
                )?
            }
        }
        Ok(outcome)
    }

    /// Runs both pipelines on their timers until SIGINT or SIGTERM.
    pub fn run_daemon(self) -> Result<()> {
        let lock = DaemonLock::acquire(&self.paths.daemon_lock_file())?;
        let cancel = CancellationToken::new();
        for signal in [SIGINT, SIGTERM] {
            signal_hook::flag::register(signal, cancel.flag())
                .with_context(|| format!("failed to register handler for signal {signal}"))?;
        }

        info!(
            lock = %lock.path().display(),
            scan_interval_secs = self.config.scan.interval_secs,
            forecast_interval_secs = self.config.forecast.interval_secs,
            "noaa index daemon started"
        );
        audit::append_event(&self.paths, "daemon", "started", &format!("pid={}", std::process::id()))?;

        let indexer = Arc::new(self);
        let jobs = vec![
            PeriodicJob {
                name: "scan",
                interval: Duration::from_secs(indexer.config.scan.interval_secs),
                run: {
                    let indexer = Arc::clone(&indexer);
                    Arc::new(move |cancel: &CancellationToken| {
                        if let Err(err) = indexer.scan_cycle(cancel) {
                            error!("scan cycle bookkeeping failed: {err:#}");
                        }
                    })
                },
            },
            PeriodicJob {
                name: "forecast",
                interval: Duration::from_secs(indexer.config.forecast.interval_secs),
                run: {
                    let indexer = Arc::clone(&indexer);
                    Arc::new(move |cancel: &CancellationToken| {
                        if let Err(err) = indexer.forecast_cycle(cancel) {
                            error!("forecast cycle bookkeeping failed: {err:#}");
                        }
                    })
                },
            },
        ];
        run_periodic(jobs, &cancel);

        info!("noaa index daemon stopped");
        audit::append_event(&indexer.paths, "daemon", "stopped", "signal received")?;
        drop(lock);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noaa::config::RemoteConfig;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn cycles_write_audit_records_against_local_store() {
        let tmp = tempdir().expect("tempdir");
        let share = tmp.path().join("share");
        fs::create_dir_all(&share).expect("mkdir");
        fs::write(
            share.join("upcoming_passes.txt"),
            "1680350400,1680351300,42,x,NOAA 19,y,z\n",
        )
        .expect("write");

        let paths = IndexPaths {
            home: tmp.path().to_path_buf(),
            db_dir: tmp.path().join("db"),
            logs_dir: tmp.path().join("logs"),
        };
        let config = IndexConfig {
            remote: RemoteConfig {
                base_uri: share.display().to_string(),
                ..RemoteConfig::default()
            },
            ..IndexConfig::default()
        };
        let indexer = Indexer::new(paths.clone(), config).expect("indexer");
        let cancel = CancellationToken::new();

        assert!(matches!(
            indexer.scan_cycle(&cancel).expect("scan"),
            ScanOutcome::Completed(_)
        ));
        assert!(matches!(
            indexer.forecast_cycle(&cancel).expect("forecast"),
            ForecastOutcome::Completed(_)
        ));
        assert_eq!(indexer.forecast.get().expect("forecast").len(), 1);

        let events = audit::read_events(&paths).expect("audit");
        let phases = events
            .iter()
            .map(|e| (e.phase.as_str(), e.status.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(phases, vec![("scan", "ok"), ("forecast", "ok")]);
    }

    #[test]
    fn failed_site_marks_scan_audit_as_error_and_other_sites_are_cataloged() {
        let tmp = tempdir().expect("tempdir");
        let share = tmp.path().join("share");
        fs::create_dir_all(share.join("north/meta/2023/04")).expect("mkdir");
        fs::create_dir_all(share.join("north/images/2023/04")).expect("mkdir");
        fs::create_dir_all(share.join("south/meta/2023/04")).expect("mkdir");
        fs::create_dir_all(share.join("south/images/2023/04")).expect("mkdir");
        let meta = "CHAN_A=Channel A: 2 (near infrared)\nCHAN_B=Channel B: 4 (thermal infrared)\nGAIN=Gain: 1\nMAXELEV=40\n";
        for (site, key) in [("north", "20230401-120000-NOAA19"), ("south", "20230401-140000-NOAA18")] {
            fs::write(share.join(format!("{site}/meta/2023/04/{key}.txt")), meta).expect("meta");
        }
        fs::write(
            share.join("north/images/2023/04/20230401-120000-NOAA19-RAW.png"),
            "not a png",
        )
        .expect("raw");
        let mut png = std::io::Cursor::new(Vec::new());
        image::RgbImage::from_pixel(8, 4, image::Rgb([1, 2, 3]))
            .write_to(&mut png, image::ImageFormat::Png)
            .expect("encode");
        fs::write(
            share.join("south/images/2023/04/20230401-140000-NOAA18-RAW.png"),
            png.into_inner(),
        )
        .expect("raw");

        let paths = IndexPaths {
            home: tmp.path().to_path_buf(),
            db_dir: tmp.path().join("db"),
            logs_dir: tmp.path().join("logs"),
        };
        let config = IndexConfig {
            remote: RemoteConfig {
                base_uri: share.display().to_string(),
                ..RemoteConfig::default()
            },
            sites: vec!["north".to_string(), "south".to_string()],
            ..IndexConfig::default()
        };
        let indexer = Indexer::new(paths.clone(), config).expect("indexer");

        assert!(matches!(
            indexer.scan_cycle(&CancellationToken::new()).expect("scan"),
            ScanOutcome::Aborted { .. }
        ));
        let passes = indexer.catalog.get().expect("catalog");
        assert_eq!(passes.len(), 1);
        assert_eq!(passes[0].site, "south");

        let events = audit::read_events(&paths).expect("audit");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, "error");
        assert!(events[0].message.contains("failure[site=north code=E006_THUMBNAIL_DECODE"));
    }
}
