//! Filesystem watching for `watch = true` descriptors.
//!
//! One watcher per app, rooted at the descriptor's `cwd`. Change events
//! are debounced into a broadcast signal; every instance of the app
//! subscribes and restarts on receipt.

use anyhow::{Context, Result};
use notify::event::EventKind;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::debug;

/// A running filesystem watcher for one app.
///
/// Dropping the handle stops the watcher thread.
pub struct FsWatcher {
    _watcher: RecommendedWatcher,
    tx: broadcast::Sender<()>,
}

impl FsWatcher {
    /// Watch `dir` recursively, collapsing event bursts within
    /// `debounce` into a single signal.
    pub fn start(dir: &Path, debounce: Duration) -> Result<Self> {
        let (tx, _) = broadcast::channel(16);
        let sender = tx.clone();
        let mut last_sent: Option<Instant> = None;

        let mut watcher =
            notify::recommended_watcher(move |result: notify::Result<Event>| {
                let Ok(event) = result else { return };
                if !is_change(&event.kind) {
                    return;
                }

                let now = Instant::now();
                if last_sent.is_some_and(|at| now.duration_since(at) < debounce) {
                    return;
                }
                last_sent = Some(now);
                let _ = sender.send(());
            })
            .context("Failed to create filesystem watcher")?;

        watcher
            .watch(dir, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch directory: {}", dir.display()))?;

        debug!(dir = %dir.display(), "Watching for file changes");
        Ok(Self {
            _watcher: watcher,
            tx,
        })
    }

    /// Subscribe to debounced change signals.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }
}

/// Content-affecting events only; access/metadata noise is ignored.
fn is_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_kinds() {
        use notify::event::{CreateKind, ModifyKind, RemoveKind};

        assert!(is_change(&EventKind::Create(CreateKind::File)));
        assert!(is_change(&EventKind::Modify(ModifyKind::Any)));
        assert!(is_change(&EventKind::Remove(RemoveKind::File)));
        assert!(!is_change(&EventKind::Access(
            notify::event::AccessKind::Any
        )));
        assert!(!is_change(&EventKind::Any));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_watcher_signals_on_write() {
        let tmp = tempfile::tempdir().unwrap();
        let watcher = FsWatcher::start(tmp.path(), Duration::from_millis(50)).unwrap();
        let mut rx = watcher.subscribe();

        tokio::task::spawn_blocking({
            let dir = tmp.path().to_path_buf();
            move || {
                for i in 0..20 {
                    std::fs::write(dir.join("app.py"), format!("change {i}")).unwrap();
                    std::thread::sleep(Duration::from_millis(100));
                }
            }
        });

        tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("no watch signal within timeout")
            .expect("watch channel closed");
    }
}
