use anyhow::Result;
use std::fs;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use crate::commands::CommandReport;
use crate::noaa::daemon_lock::read_payload;
use crate::noaa::paths::resolve_paths;
use crate::noaa::util::{pid_alive, pid_command_line, terminate};

const STOP_TIMEOUT: Duration = Duration::from_secs(8);
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);
const DAEMON_COMMAND_MARKER: &str = "watch";

/// True when the command line looks like `noaa-index watch --daemon`.
pub fn is_daemon_command(command_line: &str) -> bool {
    let mut args = command_line.split_whitespace();
    args.any(|arg| arg == DAEMON_COMMAND_MARKER) && args.any(|arg| arg == "--daemon")
}

/// Polls until `pid` exits or the timeout passes; true when it exited.
fn wait_for_exit(pid: u32) -> Result<bool> {
    let deadline = Instant::now() + STOP_TIMEOUT;
    loop {
        if !pid_alive(pid)? {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        thread::sleep(STOP_POLL_INTERVAL);
    }
}

fn cleanup_lock_file(lock_path: &Path, report: &mut CommandReport) {
    match fs::remove_file(lock_path) {
        Ok(()) => report.detail(format!("removed stale daemon lock {}", lock_path.display())),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => report.detail(format!(
            "failed to remove daemon lock {}: {err}",
            lock_path.display()
        )),
    }
}

pub fn run() -> Result<CommandReport> {
    let mut report = CommandReport::new("stop");
    let lock_path = resolve_paths()?.daemon_lock_file();
    report.detail(format!("daemon_lock={}", lock_path.display()));

    if !lock_path.exists() {
        report.detail("daemon already stopped (lock file not found)");
        return Ok(report);
    }

    let pid = match read_payload(&lock_path) {
        Ok(payload) => payload.pid,
        Err(err) => {
            report.issue(format!(
                "failed to read daemon pid from lock {}: {err:#}",
                lock_path.display()
            ));
            return Ok(report);
        }
    };
    report.detail(format!("daemon_pid={pid}"));

    if !pid_alive(pid)? {
        report.detail(format!("daemon pid {pid} is not running"));
        cleanup_lock_file(&lock_path, &mut report);
        return Ok(report);
    }

    let command_line = pid_command_line(pid)?;
    if !is_daemon_command(&command_line) {
        let shown = if command_line.is_empty() {
            "<unknown>"
        } else {
            command_line.as_str()
        };
        report.issue(format!(
            "refusing to stop pid {pid}; command does not match the index daemon: {shown}"
        ));
        return Ok(report);
    }

    terminate(pid)?;
    if wait_for_exit(pid)? {
        report.detail(format!("stopped index daemon pid={pid}"));
        cleanup_lock_file(&lock_path, &mut report);
    } else {
        report.issue(format!(
            "timed out waiting for daemon pid {pid} to stop after {}s",
            STOP_TIMEOUT.as_secs()
        ));
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::is_daemon_command;

    #[test]
    fn daemon_command_requires_watch_then_daemon_flag() {
        assert!(is_daemon_command("/usr/bin/noaa-index watch --daemon"));
        assert!(is_daemon_command("noaa-index --json watch --daemon"));
        assert!(!is_daemon_command("noaa-index watch --once"));
        assert!(!is_daemon_command("/usr/bin/vim watch.rs"));
        assert!(!is_daemon_command(""));
    }
}
