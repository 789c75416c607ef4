//! Per-instance lifecycle loop.
//!
//! Each instance runs one monitor task: spawn the child, then wait on
//! whichever comes first - child exit, memory ceiling breach, watch
//! signal, or shutdown - and react per the descriptor's restart policy.
//! Restart delays follow an exponential backoff that resets once the
//! child has stayed up long enough to count as stable.

use backon::{BackoffBuilder, ExponentialBuilder};
use chrono::Utc;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::paths::Paths;
use crate::state::{InstanceRecord, InstanceStatus, StateStore};
use crate::utils::format_bytes;

use super::SupervisorConfig;
use super::health;
use super::spawn::{self, InstancePlan};

/// Everything one monitor task needs.
pub(crate) struct MonitorCtx {
    pub plan: Arc<InstancePlan>,
    pub paths: Paths,
    pub config: SupervisorConfig,
    pub registry: Arc<DashMap<String, InstanceRecord>>,
    pub store: StateStore,
    pub watch: Option<broadcast::Receiver<()>>,
    pub shutdown: broadcast::Receiver<()>,
}

/// Why the monitor woke up.
enum Outcome {
    Exited(Option<std::process::ExitStatus>),
    MemoryBreach(u64),
    WatchRestart,
    Shutdown,
}

pub(crate) async fn run_instance(mut ctx: MonitorCtx) {
    let instance = ctx.plan.instance.clone();
    let autorestart = ctx.plan.descriptor.autorestart;
    let mut backoff = restart_backoff(&ctx.config);
    let mut restarts: u32 = 0;

    loop {
        let launched_at = Instant::now();
        let mut child = match spawn::spawn_instance(&ctx.plan, &ctx.paths).await {
            Ok(child) => child,
            Err(e) => {
                warn!(instance = %instance, error = %e, "Spawn failed");
                transition(&ctx, |r| {
                    r.status = InstanceStatus::Errored;
                    r.pid = None;
                });

                if !autorestart {
                    return;
                }
                let delay = backoff.next().unwrap_or(ctx.config.restart_max_delay);
                warn!(
                    instance = %instance,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying spawn"
                );
                if !sleep_unless_shutdown(delay, &mut ctx.shutdown).await {
                    mark_stopped(&ctx);
                    return;
                }
                continue;
            },
        };

        let pid = child.id().unwrap_or_default();
        info!(instance = %instance, pid, restarts, "Instance online");
        transition(&ctx, |r| {
            r.status = InstanceStatus::Online;
            r.pid = Some(pid);
            r.started_at = Some(Utc::now());
            r.restarts = restarts;
        });

        let memory_limit = ctx.plan.memory_limit;
        let outcome = tokio::select! {
            status = child.wait() => Outcome::Exited(status.ok()),
            used = memory_breach(pid, memory_limit.unwrap_or(u64::MAX), ctx.config.memory_poll_interval),
                if memory_limit.is_some() => Outcome::MemoryBreach(used),
            () = watch_signal(&mut ctx.watch) => Outcome::WatchRestart,
            _ = ctx.shutdown.recv() => Outcome::Shutdown,
        };

        match outcome {
            Outcome::Shutdown => {
                info!(instance = %instance, pid, "Stopping instance");
                spawn::terminate(&mut child, ctx.config.kill_grace).await;
                spawn::remove_pid_file(&ctx.paths, &instance);
                mark_stopped(&ctx);
                return;
            },
            Outcome::WatchRestart => {
                info!(instance = %instance, pid, "File change detected, restarting");
                spawn::terminate(&mut child, ctx.config.kill_grace).await;
                spawn::remove_pid_file(&ctx.paths, &instance);
                // Operator-style restart: no delay, fresh backoff
                backoff = restart_backoff(&ctx.config);
                restarts += 1;
                transition(&ctx, |r| {
                    r.status = InstanceStatus::Restarting;
                    r.pid = None;
                });
                continue;
            },
            Outcome::MemoryBreach(used) => {
                warn!(
                    instance = %instance,
                    pid,
                    used = %format_bytes(used),
                    limit = %format_bytes(memory_limit.unwrap_or_default()),
                    "Memory limit exceeded, terminating"
                );
                spawn::terminate(&mut child, ctx.config.kill_grace).await;
                spawn::remove_pid_file(&ctx.paths, &instance);
                if !autorestart {
                    mark_stopped(&ctx);
                    return;
                }
            },
            Outcome::Exited(status) => {
                let status_text = status.map_or_else(|| "unknown".to_string(), |s| s.to_string());
                spawn::remove_pid_file(&ctx.paths, &instance);
                if !autorestart {
                    info!(
                        instance = %instance,
                        status = %status_text,
                        "Instance exited, autorestart disabled"
                    );
                    mark_stopped(&ctx);
                    return;
                }
                warn!(instance = %instance, status = %status_text, "Instance exited unexpectedly");
            },
        }

        // Restart path: memory breach or unexpected exit with autorestart on
        if launched_at.elapsed() >= ctx.config.stable_uptime {
            backoff = restart_backoff(&ctx.config);
        }
        let delay = backoff.next().unwrap_or(ctx.config.restart_max_delay);
        restarts += 1;
        transition(&ctx, |r| {
            r.status = InstanceStatus::Restarting;
            r.pid = None;
        });
        info!(
            instance = %instance,
            delay_ms = delay.as_millis() as u64,
            attempt = restarts,
            "Scheduling restart"
        );
        if !sleep_unless_shutdown(delay, &mut ctx.shutdown).await {
            mark_stopped(&ctx);
            return;
        }
    }
}

/// Fresh restart-delay sequence from the configured policy.
fn restart_backoff(config: &SupervisorConfig) -> impl Iterator<Item = Duration> + use<> {
    ExponentialBuilder::default()
        .with_min_delay(config.restart_initial_delay)
        .with_max_delay(config.restart_max_delay)
        .with_factor(config.restart_factor)
        .with_jitter()
        .without_max_times()
        .build()
}

/// Resolves once resident memory crosses `limit`, returning the sampled
/// usage. Never resolves while the child stays under the ceiling; the
/// whole future is dropped when the child exits, so a breach can fire at
/// most once per spawned process.
async fn memory_breach(pid: u32, limit: u64, interval: Duration) -> u64 {
    loop {
        tokio::time::sleep(interval).await;
        let sampled = tokio::task::spawn_blocking(move || health::memory_usage(pid))
            .await
            .ok()
            .flatten();
        if let Some(used) = sampled
            && used > limit
        {
            return used;
        }
    }
}

/// Resolves on the next debounced watch signal; pends forever when the
/// app has no watcher or the watcher has gone away.
async fn watch_signal(rx: &mut Option<broadcast::Receiver<()>>) {
    loop {
        match rx {
            None => return std::future::pending().await,
            Some(receiver) => match receiver.recv().await {
                Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => return,
                Err(broadcast::error::RecvError::Closed) => *rx = None,
            },
        }
    }
}

/// Sleep for `delay`; returns false if shutdown arrived first.
async fn sleep_unless_shutdown(delay: Duration, shutdown: &mut broadcast::Receiver<()>) -> bool {
    tokio::select! {
        () = tokio::time::sleep(delay) => true,
        _ = shutdown.recv() => false,
    }
}

fn mark_stopped(ctx: &MonitorCtx) {
    transition(ctx, |r| {
        r.status = InstanceStatus::Stopped;
        r.pid = None;
    });
}

/// Apply a record update and persist the whole snapshot.
fn transition<F>(ctx: &MonitorCtx, update: F)
where
    F: FnOnce(&mut InstanceRecord),
{
    if let Some(mut record) = ctx.registry.get_mut(&ctx.plan.instance) {
        update(&mut record);
    }

    let snapshot: BTreeMap<String, InstanceRecord> = ctx
        .registry
        .iter()
        .map(|entry| (entry.key().clone(), entry.value().clone()))
        .collect();
    if let Err(e) = ctx.store.save(&snapshot) {
        warn!(error = %e, "Failed to persist state snapshot");
    }
}
