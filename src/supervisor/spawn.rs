//! Instance planning and child process spawning.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::ProcessDescriptor;
use crate::error::{Error, Result};
use crate::paths::Paths;

use super::command::resolve_argv;
use super::logs::{self, LogPaths, LogSink};

/// Environment variable carrying the instance index into the child.
pub const INSTANCE_ENV: &str = "PMX_INSTANCE";

/// Everything needed to launch one copy of a descriptor.
#[derive(Debug, Clone)]
pub struct InstancePlan {
    /// Instance name: the app name, suffixed with `-<index>` when scaled.
    pub instance: String,
    pub index: usize,
    pub descriptor: Arc<ProcessDescriptor>,
    /// Fully resolved argv (interpreter handling already applied).
    pub argv: Vec<String>,
    pub logs: LogPaths,
    /// Memory ceiling in bytes, if configured.
    pub memory_limit: Option<u64>,
}

impl InstancePlan {
    /// Expand a descriptor into one plan per configured instance.
    pub fn plan_app(descriptor: &ProcessDescriptor, paths: &Paths) -> Result<Vec<Arc<Self>>> {
        let count = descriptor.instances.resolve()?;
        let scaled = count > 1;
        let memory_limit = descriptor.max_memory_bytes()?;
        let argv = resolve_argv(descriptor);
        let descriptor = Arc::new(descriptor.clone());

        Ok((0..count)
            .map(|index| {
                let instance = if scaled {
                    format!("{}-{index}", descriptor.name)
                } else {
                    descriptor.name.clone()
                };
                let logs = LogPaths::for_instance(&descriptor, paths, &instance, index, scaled);
                Arc::new(Self {
                    instance,
                    index,
                    descriptor: Arc::clone(&descriptor),
                    argv: argv.clone(),
                    logs,
                    memory_limit,
                })
            })
            .collect())
    }
}

/// Spawn one instance: verify the working directory, overlay the
/// descriptor environment, wire both output streams into log pumps, and
/// record the pid file.
///
/// The child inherits the supervisor's environment with the descriptor's
/// `env` map layered on top, plus `PMX_INSTANCE` set to the instance
/// index.
pub async fn spawn_instance(plan: &InstancePlan, paths: &Paths) -> Result<Child> {
    let descriptor = &plan.descriptor;

    if !descriptor.cwd.is_dir() {
        return Err(Error::MissingWorkdir {
            name: plan.instance.clone(),
            cwd: descriptor.cwd.clone(),
        });
    }

    let (program, args) = plan
        .argv
        .split_first()
        .ok_or_else(|| Error::spawn(&plan.instance, "empty command line"))?;

    let mut child = Command::new(program)
        .args(args)
        .current_dir(&descriptor.cwd)
        .envs(&descriptor.env)
        .env(INSTANCE_ENV, plan.index.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::spawn(&plan.instance, e.to_string()))?;

    let pid = child
        .id()
        .ok_or_else(|| Error::spawn(&plan.instance, "child exited before pid was known"))?;

    let pid_path = paths.pid_path(&plan.instance);
    std::fs::write(&pid_path, pid.to_string())
        .map_err(|e| Error::io(format!("writing {}", pid_path.display()), e))?;

    let combined = Arc::new(Mutex::new(
        logs::open_append(&plan.logs.combined)
            .await
            .map_err(|e| Error::spawn(&plan.instance, e.to_string()))?,
    ));

    if let Some(stdout) = child.stdout.take() {
        let sink = LogSink::open(&plan.logs.out, Arc::clone(&combined), descriptor.time)
            .await
            .map_err(|e| Error::spawn(&plan.instance, e.to_string()))?;
        tokio::spawn(logs::pump_stream(stdout, sink, plan.instance.clone(), "stdout"));
    }

    if let Some(stderr) = child.stderr.take() {
        let sink = LogSink::open(&plan.logs.error, combined, descriptor.time)
            .await
            .map_err(|e| Error::spawn(&plan.instance, e.to_string()))?;
        tokio::spawn(logs::pump_stream(stderr, sink, plan.instance.clone(), "stderr"));
    }

    debug!(instance = %plan.instance, pid, "Spawned child");
    Ok(child)
}

/// Remove an instance's pid file. Missing files are fine.
pub fn remove_pid_file(paths: &Paths, instance: &str) {
    let path = paths.pid_path(instance);
    if let Err(e) = std::fs::remove_file(&path)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(instance, error = %e, "Failed to remove pid file");
    }
}

/// Stop a child: SIGTERM, wait out the grace period, then SIGKILL.
pub async fn terminate(child: &mut Child, grace: Duration) {
    let Some(pid) = child.id() else {
        // Already reaped
        return;
    };

    send_term(pid);

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(_) => {},
        Err(_) => {
            warn!(pid, "Child ignored SIGTERM, killing");
            if let Err(e) = child.kill().await {
                warn!(pid, error = %e, "Failed to kill child");
            }
        },
    }
}

#[cfg(unix)]
fn send_term(pid: u32) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    #[allow(clippy::cast_possible_wrap)]
    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        warn!(pid, error = %e, "Failed to signal child");
    }
}

#[cfg(not(unix))]
fn send_term(_pid: u32) {
    // No SIGTERM equivalent; terminate() falls through to kill().
}
