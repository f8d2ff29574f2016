pub mod local;
#[cfg(test)]
pub mod memory;
pub mod webdav;

use crate::error::RemoteError;
use crate::noaa::config::RemoteConfig;
use chrono::{DateTime, Utc};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub is_directory: bool,
    pub length: Option<u64>,
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteStat {
    pub exists: bool,
    pub length: Option<u64>,
    pub last_modified: Option<DateTime<Utc>>,
}

impl RemoteStat {
    pub fn missing() -> Self {
        Self::default()
    }
}

/// Hierarchical file store the ground station uploads into.
///
/// Paths are `/`-separated and relative to the store root. Not-found is never an
/// error for `list_directory`, `stat` or `delete_file`; every other non-success
/// response is.
pub trait RemoteFileStore: Send + Sync {
    fn list_directory(&self, path: &str) -> Result<Vec<RemoteEntry>, RemoteError>;

    fn stat(&self, path: &str) -> Result<RemoteStat, RemoteError>;

    fn open_read(&self, path: &str) -> Result<Box<dyn Read + Send>, RemoteError>;

    /// Returns `false` when the file was already gone.
    fn delete_file(&self, path: &str) -> Result<bool, RemoteError>;

    fn read_to_end(&self, path: &str) -> Result<Vec<u8>, RemoteError> {
        let mut reader = self.open_read(path)?;
        let mut out = Vec::new();
        reader
            .read_to_end(&mut out)
            .map_err(|source| RemoteError::Io {
                op: "reading",
                path: path.to_string(),
                source,
            })?;
        Ok(out)
    }
}

/// Root path of a site's namespace; the default site lives at the store root.
pub fn site_base(site: &str) -> String {
    if site.is_empty() {
        String::new()
    } else {
        format!("/{site}")
    }
}

pub fn join(base: &str, parts: &[&str]) -> String {
    let mut out = base.trim_end_matches('/').to_string();
    for part in parts {
        let part = part.trim_matches('/');
        if part.is_empty() {
            continue;
        }
        out.push('/');
        out.push_str(part);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// File name without its last extension (`a.b.txt` -> `a.b`).
pub fn file_stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    }
}

pub fn open_store(cfg: &RemoteConfig) -> Result<Arc<dyn RemoteFileStore>, RemoteError> {
    let base = cfg.base_uri.trim();
    if base.is_empty() {
        return Err(RemoteError::InvalidLocation(base.to_string()));
    }

    if base.starts_with("http://") || base.starts_with("https://") {
        let timeout = (cfg.timeout_secs > 0).then(|| Duration::from_secs(cfg.timeout_secs));
        let store = webdav::WebDavStore::new(
            base,
            cfg.user.clone(),
            cfg.password.clone(),
            timeout,
        )?;
        return Ok(Arc::new(store));
    }

    let root = base.strip_prefix("file://").unwrap_or(base);
    Ok(Arc::new(local::LocalFileStore::new(PathBuf::from(root))))
}
