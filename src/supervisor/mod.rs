//! Process supervision runtime.
//!
//! The [`Supervisor`] expands a validated [`EcosystemFile`] into one plan
//! per instance, spawns a monitor task for each, and runs until every
//! monitor finishes - either because shutdown was requested (OS signal or
//! [`SupervisorHandle::shutdown`]) or because every non-restarting
//! instance has exited.
//!
//! ## Module Structure
//!
//! - [`command`]: argv resolution (interpreter handling)
//! - [`spawn`]: instance planning, child spawning, termination
//! - `monitor`: the per-instance lifecycle loop
//! - [`logs`]: log capture and tailing
//! - [`health`]: process-table liveness and memory queries
//! - [`watch`]: debounced filesystem watching

pub mod command;
pub mod health;
pub mod logs;
mod monitor;
pub mod spawn;
pub mod watch;

pub use command::{NO_INTERPRETER, resolve_argv};
pub use spawn::{INSTANCE_ENV, InstancePlan};

use anyhow::{Context, Result};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::EcosystemFile;
use crate::constants;
use crate::paths::Paths;
use crate::state::{InstanceRecord, InstanceStatus, StateStore};

/// Tunables for the supervision runtime.
///
/// Defaults come from [`constants`]; tests shrink the delays.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// First restart delay after a failure.
    pub restart_initial_delay: Duration,
    /// Ceiling for the restart delay.
    pub restart_max_delay: Duration,
    /// Backoff multiplier between attempts.
    pub restart_factor: f32,
    /// Uptime after which the backoff resets.
    pub stable_uptime: Duration,
    /// SIGTERM-to-SIGKILL grace period.
    pub kill_grace: Duration,
    /// Resident-memory sampling interval.
    pub memory_poll_interval: Duration,
    /// Quiet window for watch events.
    pub watch_debounce: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            restart_initial_delay: constants::RESTART_INITIAL_DELAY,
            restart_max_delay: constants::RESTART_MAX_DELAY,
            restart_factor: constants::RESTART_FACTOR,
            stable_uptime: constants::STABLE_UPTIME,
            kill_grace: constants::KILL_GRACE,
            memory_poll_interval: constants::MEMORY_POLL_INTERVAL,
            watch_debounce: constants::WATCH_DEBOUNCE,
        }
    }
}

/// Requests shutdown of a running [`Supervisor`] from another task.
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    shutdown: broadcast::Sender<()>,
}

impl SupervisorHandle {
    /// Ask every monitor to stop its child and exit.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }
}

/// Supervises every app in an ecosystem file.
pub struct Supervisor {
    file: EcosystemFile,
    paths: Paths,
    config: SupervisorConfig,
    registry: Arc<DashMap<String, InstanceRecord>>,
    store: StateStore,
    shutdown: broadcast::Sender<()>,
}

impl Supervisor {
    /// Build a supervisor with default tuning.
    #[must_use]
    pub fn new(file: EcosystemFile, paths: Paths) -> Self {
        Self::with_config(file, paths, SupervisorConfig::default())
    }

    /// Build a supervisor with explicit tuning.
    #[must_use]
    pub fn with_config(file: EcosystemFile, paths: Paths, config: SupervisorConfig) -> Self {
        let store = StateStore::new(&paths);
        let (shutdown, _) = broadcast::channel(4);
        Self {
            file,
            paths,
            config,
            registry: Arc::new(DashMap::new()),
            store,
            shutdown,
        }
    }

    /// Handle for requesting shutdown programmatically.
    #[must_use]
    pub fn handle(&self) -> SupervisorHandle {
        SupervisorHandle {
            shutdown: self.shutdown.clone(),
        }
    }

    /// Run until shutdown or until every instance has stopped.
    ///
    /// Listens for SIGINT/SIGTERM; either one stops all children
    /// gracefully before returning.
    pub async fn run(self) -> Result<()> {
        self.paths.ensure_layout()?;

        let mut watchers = Vec::new();
        let mut monitors = JoinSet::new();

        for app in &self.file.apps {
            let plans = InstancePlan::plan_app(app, &self.paths)
                .with_context(|| format!("Failed to plan app '{}'", app.name))?;

            let watcher = if app.watch {
                Some(
                    watch::FsWatcher::start(&app.cwd, self.config.watch_debounce)
                        .with_context(|| format!("Failed to watch cwd for '{}'", app.name))?,
                )
            } else {
                None
            };

            info!(
                app = %app.name,
                instances = plans.len(),
                autorestart = app.autorestart,
                watch = app.watch,
                "Supervising app"
            );

            for plan in plans {
                self.registry
                    .insert(plan.instance.clone(), initial_record(&plan));

                monitors.spawn(monitor::run_instance(monitor::MonitorCtx {
                    plan,
                    paths: self.paths.clone(),
                    config: self.config.clone(),
                    registry: Arc::clone(&self.registry),
                    store: self.store.clone(),
                    watch: watcher.as_ref().map(watch::FsWatcher::subscribe),
                    shutdown: self.shutdown.subscribe(),
                }));
            }

            if let Some(watcher) = watcher {
                watchers.push(watcher);
            }
        }

        self.persist()?;

        let signal_shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            info!("Shutdown signal received");
            let _ = signal_shutdown.send(());
        });

        while let Some(joined) = monitors.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "Monitor task failed");
            }
        }

        drop(watchers);
        self.persist()?;
        info!("All instances stopped");
        Ok(())
    }

    fn persist(&self) -> Result<()> {
        let snapshot: BTreeMap<String, InstanceRecord> = self
            .registry
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        self.store.save(&snapshot)?;
        Ok(())
    }
}

fn initial_record(plan: &InstancePlan) -> InstanceRecord {
    InstanceRecord {
        name: plan.instance.clone(),
        app: plan.descriptor.name.clone(),
        pid: None,
        status: InstanceStatus::Restarting,
        started_at: None,
        restarts: 0,
        log_file: plan.logs.combined.clone(),
        out_file: plan.logs.out.clone(),
        error_file: plan.logs.error.clone(),
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            warn!(error = %e, "Failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        },
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigterm.recv() => {},
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
