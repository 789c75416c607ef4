//! `pmx stop` - signal recorded instances to stop.
//!
//! The foreground supervisor already stops its children on SIGINT or
//! SIGTERM; this command covers children that outlived a supervisor
//! killed without cleanup. Each live pid gets SIGTERM, a grace period,
//! then SIGKILL if it lingers.

use anyhow::{Context, Result, bail};
use std::time::Duration;

use crate::constants;
use crate::paths::Paths;
use crate::state::{InstanceStatus, StateStore};
use crate::supervisor::health;

/// Stop every recorded instance, or only those of one app/instance name.
pub async fn execute(name: Option<&str>) -> Result<()> {
    let paths = Paths::resolve()?;
    let store = StateStore::new(&paths);
    let mut records = store.load()?;

    if records.is_empty() {
        println!("No pmx instances recorded.");
        return Ok(());
    }

    let mut matched = false;
    let mut stopped = 0usize;

    for record in records.values_mut() {
        if let Some(filter) = name
            && record.name != filter
            && record.app != filter
        {
            continue;
        }
        matched = true;

        if let Some(pid) = record.pid
            && health::is_running(pid)
        {
            stop_pid(pid, constants::KILL_GRACE)
                .await
                .with_context(|| format!("Failed to stop '{}'", record.name))?;
            println!("Stopped {} (pid {pid})", record.name);
            stopped += 1;
        }

        record.status = InstanceStatus::Stopped;
        record.pid = None;

        let pid_path = paths.pid_path(&record.name);
        let _ = std::fs::remove_file(pid_path);
    }

    if !matched {
        bail!("no recorded instance or app named '{}'", name.unwrap_or_default());
    }

    store.save(&records)?;
    if stopped == 0 {
        println!("Nothing was running.");
    }
    Ok(())
}

#[cfg(unix)]
async fn stop_pid(pid: u32, grace: Duration) -> Result<()> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;
    use std::time::Instant;

    #[allow(clippy::cast_possible_wrap)]
    let target = Pid::from_raw(pid as i32);

    kill(target, Signal::SIGTERM).context("SIGTERM failed")?;

    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        if !health::is_running(pid) {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    kill(target, Signal::SIGKILL).context("SIGKILL failed")?;
    Ok(())
}

#[cfg(not(unix))]
async fn stop_pid(_pid: u32, _grace: Duration) -> Result<()> {
    bail!("stopping detached instances is only supported on unix")
}
