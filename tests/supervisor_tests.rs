//! End-to-end supervision tests against real `/bin/sh` children.

#![cfg(unix)]

use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant};

use serial_test::serial;
use tempfile::TempDir;

use pmx::config::{Args, EcosystemFile, Instances, ProcessDescriptor};
use pmx::paths::Paths;
use pmx::state::{InstanceRecord, InstanceStatus, StateStore};
use pmx::supervisor::{Supervisor, SupervisorConfig, health};

fn fast_config() -> SupervisorConfig {
    SupervisorConfig {
        restart_initial_delay: Duration::from_millis(50),
        restart_max_delay: Duration::from_millis(200),
        restart_factor: 2.0,
        stable_uptime: Duration::from_secs(60),
        kill_grace: Duration::from_secs(2),
        memory_poll_interval: Duration::from_millis(50),
        watch_debounce: Duration::from_millis(100),
    }
}

fn shell_app(name: &str, cwd: &Path, command: &str) -> ProcessDescriptor {
    ProcessDescriptor {
        name: name.to_string(),
        script: "/bin/sh".to_string(),
        args: Args::List(vec!["-c".to_string(), command.to_string()]),
        interpreter: "none".to_string(),
        cwd: cwd.to_path_buf(),
        instances: Instances::Count(1),
        autorestart: true,
        watch: false,
        max_memory_restart: None,
        env: BTreeMap::new(),
        error_file: None,
        out_file: None,
        log_file: None,
        time: false,
    }
}

fn load_record(paths: &Paths, instance: &str) -> Option<InstanceRecord> {
    StateStore::new(paths)
        .load()
        .ok()
        .and_then(|records| records.get(instance).cloned())
}

async fn wait_until<F>(mut condition: F, timeout: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

#[tokio::test]
#[serial]
async fn test_instance_comes_online_and_stops_on_shutdown() {
    let tmp = TempDir::new().unwrap();
    let paths = Paths::at(tmp.path().join("home"));
    let app = shell_app(
        "web",
        tmp.path(),
        "echo hello out; echo hello err 1>&2; sleep 30",
    );

    let supervisor = Supervisor::with_config(
        EcosystemFile { apps: vec![app] },
        paths.clone(),
        fast_config(),
    );
    let handle = supervisor.handle();
    let runner = tokio::spawn(supervisor.run());

    assert!(
        wait_until(
            || {
                load_record(&paths, "web")
                    .is_some_and(|r| r.status == InstanceStatus::Online && r.pid.is_some())
            },
            Duration::from_secs(5),
        )
        .await,
        "instance never came online"
    );

    let record = load_record(&paths, "web").unwrap();
    let pid = record.pid.unwrap();
    assert!(health::is_running(pid));
    assert!(paths.pid_path("web").exists());

    // Both streams end up in their files and in the combined log
    assert!(
        wait_until(
            || {
                let out = std::fs::read_to_string(&record.out_file).unwrap_or_default();
                let err = std::fs::read_to_string(&record.error_file).unwrap_or_default();
                let combined = std::fs::read_to_string(&record.log_file).unwrap_or_default();
                out.contains("hello out")
                    && err.contains("hello err")
                    && combined.contains("hello out")
                    && combined.contains("hello err")
            },
            Duration::from_secs(5),
        )
        .await,
        "log output never arrived"
    );

    handle.shutdown();
    tokio::time::timeout(Duration::from_secs(10), runner)
        .await
        .expect("supervisor did not stop")
        .expect("supervisor task panicked")
        .expect("supervisor returned an error");

    let record = load_record(&paths, "web").unwrap();
    assert_eq!(record.status, InstanceStatus::Stopped);
    assert_eq!(record.pid, None);
    assert!(!paths.pid_path("web").exists());
    assert!(
        wait_until(|| !health::is_running(pid), Duration::from_secs(5)).await,
        "child survived shutdown"
    );
}

#[tokio::test]
#[serial]
async fn test_autorestart_respawns_after_exit() {
    let tmp = TempDir::new().unwrap();
    let paths = Paths::at(tmp.path().join("home"));
    let app = shell_app("flaky", tmp.path(), "exit 1");

    let supervisor = Supervisor::with_config(
        EcosystemFile { apps: vec![app] },
        paths.clone(),
        fast_config(),
    );
    let handle = supervisor.handle();
    let runner = tokio::spawn(supervisor.run());

    // The child exits immediately every time, so the restart counter
    // should keep climbing through the backoff schedule.
    assert!(
        wait_until(
            || load_record(&paths, "flaky").is_some_and(|r| r.restarts >= 2),
            Duration::from_secs(10),
        )
        .await,
        "instance was never respawned"
    );

    handle.shutdown();
    tokio::time::timeout(Duration::from_secs(10), runner)
        .await
        .expect("supervisor did not stop")
        .unwrap()
        .unwrap();
}

#[tokio::test]
#[serial]
async fn test_no_restart_when_autorestart_disabled() {
    let tmp = TempDir::new().unwrap();
    let paths = Paths::at(tmp.path().join("home"));
    let mut app = shell_app("oneshot", tmp.path(), "exit 0");
    app.autorestart = false;

    let supervisor = Supervisor::with_config(
        EcosystemFile { apps: vec![app] },
        paths.clone(),
        fast_config(),
    );

    // With the only instance stopped and nothing to restart, run()
    // returns on its own.
    tokio::time::timeout(Duration::from_secs(10), supervisor.run())
        .await
        .expect("supervisor did not finish")
        .unwrap();

    let record = load_record(&paths, "oneshot").unwrap();
    assert_eq!(record.status, InstanceStatus::Stopped);
    assert_eq!(record.restarts, 0, "no respawn attempts expected");
}

#[tokio::test]
#[serial]
async fn test_memory_limit_terminates_child() {
    let tmp = TempDir::new().unwrap();
    let paths = Paths::at(tmp.path().join("home"));
    let mut app = shell_app("hog", tmp.path(), "sleep 30");
    // Any real process exceeds 1K resident, so the first sample breaches.
    app.max_memory_restart = Some("1K".to_string());
    app.autorestart = false;

    let supervisor = Supervisor::with_config(
        EcosystemFile { apps: vec![app] },
        paths.clone(),
        fast_config(),
    );

    tokio::time::timeout(Duration::from_secs(10), supervisor.run())
        .await
        .expect("memory breach never terminated the child")
        .unwrap();

    let record = load_record(&paths, "hog").unwrap();
    assert_eq!(record.status, InstanceStatus::Stopped);
    assert_eq!(record.pid, None);
}

#[tokio::test]
#[serial]
async fn test_timestamped_log_lines() {
    let tmp = TempDir::new().unwrap();
    let paths = Paths::at(tmp.path().join("home"));
    let mut app = shell_app("stamped", tmp.path(), "echo stamped-line");
    app.autorestart = false;
    app.time = true;

    let supervisor = Supervisor::with_config(
        EcosystemFile { apps: vec![app] },
        paths.clone(),
        fast_config(),
    );
    tokio::time::timeout(Duration::from_secs(10), supervisor.run())
        .await
        .unwrap()
        .unwrap();

    let record = load_record(&paths, "stamped").unwrap();
    assert!(
        wait_until(
            || {
                std::fs::read_to_string(&record.out_file)
                    .unwrap_or_default()
                    .lines()
                    .any(|line| {
                        line.ends_with(": stamped-line")
                            && line.starts_with(|c: char| c.is_ascii_digit())
                    })
            },
            Duration::from_secs(5),
        )
        .await,
        "timestamped line not found"
    );
}

#[tokio::test]
#[serial]
async fn test_scaled_app_runs_one_child_per_instance() {
    let tmp = TempDir::new().unwrap();
    let paths = Paths::at(tmp.path().join("home"));
    let mut app = shell_app("pool", tmp.path(), "sleep 30");
    app.instances = Instances::Count(2);

    let supervisor = Supervisor::with_config(
        EcosystemFile { apps: vec![app] },
        paths.clone(),
        fast_config(),
    );
    let handle = supervisor.handle();
    let runner = tokio::spawn(supervisor.run());

    assert!(
        wait_until(
            || {
                let zero = load_record(&paths, "pool-0");
                let one = load_record(&paths, "pool-1");
                matches!(
                    (zero, one),
                    (Some(a), Some(b))
                        if a.status == InstanceStatus::Online
                            && b.status == InstanceStatus::Online
                            && a.pid.is_some()
                            && b.pid.is_some()
                            && a.pid != b.pid
                )
            },
            Duration::from_secs(5),
        )
        .await,
        "scaled instances never both came online"
    );

    handle.shutdown();
    tokio::time::timeout(Duration::from_secs(10), runner)
        .await
        .expect("supervisor did not stop")
        .unwrap()
        .unwrap();
}
