use anyhow::Result;
use std::env;
use std::path::PathBuf;

pub const CATALOG_FILE: &str = "passes.json";
pub const FORECAST_FILE: &str = "upcoming_passes.json";
pub const AUDIT_FILE: &str = "audit.log";
pub const DAEMON_LOCK_FILE: &str = "noaa-index.daemon.lock";

#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub home: PathBuf,
    pub db_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl IndexPaths {
    pub fn catalog_file(&self) -> PathBuf {
        self.db_dir.join(CATALOG_FILE)
    }

    pub fn forecast_file(&self) -> PathBuf {
        self.db_dir.join(FORECAST_FILE)
    }

    pub fn audit_file(&self) -> PathBuf {
        self.logs_dir.join(AUDIT_FILE)
    }

    pub fn daemon_lock_file(&self) -> PathBuf {
        self.logs_dir.join(DAEMON_LOCK_FILE)
    }
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

pub fn resolve_paths() -> Result<IndexPaths> {
    let home = match env::var("NOAA_HOME") {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => required_home_dir()?.join("noaa-index"),
    };
    let db_dir = env_or_default_path("NOAA_DB_DIR", home.join("db"));
    let logs_dir = env_or_default_path("NOAA_LOGS_DIR", home.join("logs"));

    Ok(IndexPaths {
        home,
        db_dir,
        logs_dir,
    })
}
