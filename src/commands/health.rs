use anyhow::Result;

use crate::commands::CommandReport;
use crate::noaa::daemon_lock::read_payload;
use crate::noaa::paths::resolve_paths;
use crate::noaa::util::pid_alive;

pub fn run() -> Result<CommandReport> {
    let mut report = CommandReport::new("health");
    let paths = resolve_paths()?;

    report.detail(format!("home={}", paths.home.display()));
    for (name, path) in [("db_dir", &paths.db_dir), ("logs_dir", &paths.logs_dir)] {
        if path.exists() {
            report.detail(format!("path.{name}=ok"));
        } else {
            report.issue(format!("path.{name}=missing ({})", path.display()));
        }
    }

    let lock_path = paths.daemon_lock_file();
    if !lock_path.exists() {
        report.detail("daemon.lock=not_found (daemon likely not running)");
        return Ok(report);
    }

    let payload = match read_payload(&lock_path) {
        Ok(payload) => payload,
        Err(err) => {
            report.issue(format!("daemon.lock=corrupt ({err:#})"));
            return Ok(report);
        }
    };
    report.detail("daemon.lock=found");
    report.detail(format!("daemon.pid={}", payload.pid));
    report.detail(format!("daemon.build_uuid={}", payload.build_uuid));
    report.detail(format!("daemon.start_time={}", payload.start_time));

    if pid_alive(payload.pid)? {
        report.detail("daemon.process=alive");
    } else {
        report.issue("daemon.process=dead (stale lock)");
    }

    let current_uuid = env!("BUILD_UUID");
    if payload.build_uuid == current_uuid {
        report.detail("daemon.build_match=ok");
    } else {
        report.issue(format!(
            "daemon.build_mismatch=found (lock={} current={current_uuid})",
            payload.build_uuid
        ));
    }

    Ok(report)
}
