use anyhow::{Context, Result, bail};
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

/// Return the current Unix epoch in seconds.
pub fn now_epoch_secs() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

fn ps_field(pid: u32, field: &str) -> Result<Option<String>> {
    let output = Command::new("ps")
        .args(["-p", &pid.to_string(), "-o", field])
        .output()
        .with_context(|| format!("failed to run `ps -o {field}` for pid {pid}"))?;
    if !output.status.success() {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
}

/// Whether `pid` names a running process. Zombies count as dead.
pub fn pid_alive(pid: u32) -> Result<bool> {
    if cfg!(windows) {
        // The daemon lock itself is authoritative there.
        return Ok(true);
    }
    let probe = Command::new("kill")
        .args(["-0", &pid.to_string()])
        .status()
        .context("failed to probe process state with `kill -0`")?;
    if !probe.success() {
        return Ok(false);
    }
    Ok(ps_field(pid, "stat=")?.is_some_and(|state| !state.starts_with('Z')))
}

/// The full command line of `pid`, empty when it cannot be read.
pub fn pid_command_line(pid: u32) -> Result<String> {
    Ok(ps_field(pid, "command=")?.unwrap_or_default())
}

/// Sends SIGTERM; a process that vanished in the meantime counts as signalled.
pub fn terminate(pid: u32) -> Result<()> {
    let status = Command::new("kill")
        .args(["-TERM", &pid.to_string()])
        .status()
        .context("failed to send SIGTERM with `kill -TERM`")?;
    if status.success() || !pid_alive(pid)? {
        return Ok(());
    }
    bail!("`kill -TERM {pid}` failed and process {pid} is still alive")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_process_is_alive() {
        assert!(pid_alive(std::process::id()).expect("probe"));
        assert!(now_epoch_secs().expect("clock") > 1_600_000_000);
    }

    #[cfg(unix)]
    #[test]
    fn reaped_child_is_dead_and_has_no_command_line() {
        let mut child = Command::new("true").spawn().expect("spawn");
        let pid = child.id();
        child.wait().expect("wait");
        assert!(!pid_alive(pid).expect("probe"));
        assert_eq!(pid_command_line(pid).expect("ps"), "");
    }

    #[cfg(unix)]
    #[test]
    fn command_line_names_the_running_test_binary() {
        let line = pid_command_line(std::process::id()).expect("ps");
        assert!(!line.is_empty());
    }
}
