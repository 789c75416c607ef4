//! Process-table queries for liveness and resident memory.

use sysinfo::{Pid, ProcessesToUpdate, System};

/// Checks if a process with the given PID is currently running.
///
/// Returns `false` for non-existent processes rather than erroring,
/// making it safe to use for polling process status.
#[must_use]
pub fn is_running(pid: u32) -> bool {
    let mut system = System::new();
    let target = Pid::from(pid as usize);
    system.refresh_processes(ProcessesToUpdate::Some(&[target]), true);
    system.process(target).is_some()
}

/// Resident memory of a process in bytes, or `None` if it is gone.
#[must_use]
pub fn memory_usage(pid: u32) -> Option<u64> {
    let mut system = System::new();
    let target = Pid::from(pid as usize);
    system.refresh_processes(ProcessesToUpdate::Some(&[target]), true);
    system.process(target).map(sysinfo::Process::memory)
}
