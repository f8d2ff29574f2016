use crate::error::ErrorCode;
use crate::noaa::store::is_contended;
use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DaemonLockPayload {
    pub pid: u32,
    pub build_uuid: String,
    pub start_time: String,
}

impl DaemonLockPayload {
    pub fn current() -> Self {
        Self {
            pid: std::process::id(),
            build_uuid: env!("BUILD_UUID").to_string(),
            start_time: Utc::now().to_rfc3339(),
        }
    }
}

/// Held for the lifetime of `watch --daemon`; the file is removed on drop.
#[derive(Debug)]
pub struct DaemonLock {
    path: PathBuf,
    file: fs::File,
}

impl DaemonLock {
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .with_context(|| format!("failed to open {}", path.display()))?;

        if let Err(err) = file.try_lock_exclusive() {
            return Err(lock_error(path, err));
        }

        let payload = serde_json::to_string_pretty(&DaemonLockPayload::current())?;
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(format!("{payload}\n").as_bytes())
            .with_context(|| format!("failed to write {}", path.display()))?;
        file.sync_all()?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DaemonLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
        let _ = FileExt::unlock(&self.file);
    }
}

fn lock_error(path: &Path, err: std::io::Error) -> anyhow::Error {
    if !is_contended(&err) {
        return anyhow::Error::new(err)
            .context(format!("failed to lock daemon lock file {}", path.display()));
    }
    let holder = read_payload(path)
        .map(|payload| format!("pid {}", payload.pid))
        .unwrap_or_else(|_| "another process".to_string());
    anyhow!(
        "{}: daemon lock {} is held by {holder}",
        ErrorCode::E001Locked.as_str(),
        path.display()
    )
}

pub fn read_payload(path: &Path) -> Result<DaemonLockPayload> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}
