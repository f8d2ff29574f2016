use crate::error::ErrorCode;
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_uri: String,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Zero disables the request timeout.
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScanConfig {
    pub interval_secs: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ForecastConfig {
    pub interval_secs: u64,
    pub source_file: String,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            source_file: "upcoming_passes.txt".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct IndexConfig {
    pub remote: RemoteConfig,
    pub sites: Vec<String>,
    pub scan: ScanConfig,
    pub forecast: ForecastConfig,
}

impl IndexConfig {
    /// Configured sites, or the single default site `""`.
    pub fn site_list(&self) -> Vec<String> {
        if self.sites.is_empty() {
            vec![String::new()]
        } else {
            self.sites.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialIndexConfig {
    remote: Option<RemoteConfig>,
    sites: Option<Vec<String>>,
    scan: Option<ScanConfig>,
    forecast: Option<ForecastConfig>,
}

type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

fn env_or_u64(env: EnvLookup<'_>, var: &str, fallback: u64) -> u64 {
    match env(var) {
        Some(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        None => fallback,
    }
}

fn env_or_string(env: EnvLookup<'_>, var: &str, fallback: &str) -> String {
    match env(var) {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn env_or_optional_string(env: EnvLookup<'_>, var: &str, fallback: Option<String>) -> Option<String> {
    match env(var) {
        Some(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => fallback,
    }
}

fn env_or_csv(env: EnvLookup<'_>, var: &str, fallback: &[String]) -> Vec<String> {
    match env(var) {
        Some(v) => {
            let out = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToOwned::to_owned)
                .collect::<Vec<_>>();
            if out.is_empty() {
                fallback.to_vec()
            } else {
                out
            }
        }
        None => fallback.to_vec(),
    }
}

fn invalid(message: impl std::fmt::Display) -> anyhow::Error {
    anyhow!("{}: {message}", ErrorCode::E008ConfigInvalid.as_str())
}

pub fn validate(cfg: &IndexConfig) -> Result<()> {
    if cfg.remote.base_uri.trim().is_empty() {
        return Err(invalid(
            "remote base uri is empty; set NOAA_REMOTE_URI or [remote].base_uri",
        ));
    }
    if cfg.scan.interval_secs == 0 {
        return Err(invalid("invalid scan interval: must be >= 1 second"));
    }
    if cfg.forecast.interval_secs == 0 {
        return Err(invalid("invalid forecast interval: must be >= 1 second"));
    }
    if cfg.forecast.source_file.trim().is_empty() {
        return Err(invalid("invalid forecast source file: cannot be empty"));
    }
    if let Some(site) = cfg.sites.iter().find(|s| s.contains('/') || s.trim().is_empty()) {
        return Err(invalid(format!(
            "invalid site name `{site}`: must be non-empty and contain no `/`"
        )));
    }
    Ok(())
}

pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(custom) = env::var("NOAA_CONFIG_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    let home = dirs::home_dir()?;
    Some(home.join(".noaa-index").join("config.toml"))
}

fn merge_toml(base: &mut IndexConfig, raw: &str) -> Result<()> {
    let parsed: PartialIndexConfig = toml::from_str(raw)?;
    if let Some(remote) = parsed.remote {
        base.remote = remote;
    }
    if let Some(sites) = parsed.sites {
        base.sites = sites;
    }
    if let Some(scan) = parsed.scan {
        base.scan = scan;
    }
    if let Some(forecast) = parsed.forecast {
        base.forecast = forecast;
    }
    Ok(())
}

fn merge_file_config(base: &mut IndexConfig) -> Result<()> {
    let Some(path) = resolve_config_path() else {
        return Ok(());
    };
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(&path)?;
    merge_toml(base, &raw)
        .map_err(|err| invalid(format!("failed to parse {}: {err}", path.display())))
}

fn apply_env(cfg: &mut IndexConfig, env: EnvLookup<'_>) {
    cfg.remote.base_uri = env_or_string(env, "NOAA_REMOTE_URI", &cfg.remote.base_uri);
    cfg.remote.user = env_or_optional_string(env, "NOAA_REMOTE_USER", cfg.remote.user.take());
    cfg.remote.password =
        env_or_optional_string(env, "NOAA_REMOTE_PASSWORD", cfg.remote.password.take());
    cfg.remote.timeout_secs =
        env_or_u64(env, "NOAA_REMOTE_TIMEOUT_SECS", cfg.remote.timeout_secs);
    cfg.sites = env_or_csv(env, "NOAA_SITES", &cfg.sites);
    cfg.scan.interval_secs = env_or_u64(env, "NOAA_SCAN_INTERVAL_SECS", cfg.scan.interval_secs);
    cfg.forecast.interval_secs =
        env_or_u64(env, "NOAA_FORECAST_INTERVAL_SECS", cfg.forecast.interval_secs);
    cfg.forecast.source_file =
        env_or_string(env, "NOAA_FORECAST_SOURCE_FILE", &cfg.forecast.source_file);
}

pub fn load_config() -> Result<IndexConfig> {
    let mut cfg = IndexConfig::default();
    merge_file_config(&mut cfg)?;
    apply_env(&mut cfg, &|var: &str| env::var(var).ok());
    validate(&cfg)?;
    Ok(cfg)
}
