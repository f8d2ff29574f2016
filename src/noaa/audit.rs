use crate::noaa::paths::IndexPaths;
use crate::noaa::util::now_epoch_secs;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditEvent {
    pub at_epoch_secs: u64,
    pub phase: String,
    pub status: String,
    pub message: String,
}

pub fn append_event(paths: &IndexPaths, phase: &str, status: &str, message: &str) -> Result<()> {
    fs::create_dir_all(&paths.logs_dir)
        .with_context(|| format!("failed to create {}", paths.logs_dir.display()))?;
    let event = AuditEvent {
        at_epoch_secs: now_epoch_secs()?,
        phase: phase.to_string(),
        status: status.to_string(),
        message: message.to_string(),
    };

    let line = format!("{}\n", serde_json::to_string(&event)?);
    let path = paths.audit_file();
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(line.as_bytes())?;
    Ok(())
}

pub fn read_events(paths: &IndexPaths) -> Result<Vec<AuditEvent>> {
    let path = paths.audit_file();
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw =
        fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            serde_json::from_str::<AuditEvent>(line)
                .with_context(|| format!("failed to parse audit line in {}", path.display()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_event_writes_one_json_line_per_call() {
        let tmp = tempdir().expect("tempdir");
        let paths = IndexPaths {
            home: tmp.path().to_path_buf(),
            db_dir: tmp.path().join("db"),
            logs_dir: tmp.path().join("logs"),
        };

        append_event(&paths, "scan", "ok", "cataloged=1").expect("append");
        append_event(&paths, "forecast", "error", "remote down").expect("append");

        let events = read_events(&paths).expect("read");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].phase, "scan");
        assert_eq!(events[1].status, "error");
        assert_eq!(events[1].message, "remote down");
    }
}
