//! Instance records shared between the supervisor and the CLI.
//!
//! The supervisor keeps live records in memory and snapshots them to
//! `state.json` on every transition; `ps`, `stop`, and `logs` read the
//! snapshot back. One record per instance, keyed by instance name.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::paths::Paths;

/// Lifecycle phase of a supervised instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Child process is running.
    Online,
    /// Child exited and the supervisor is waiting out the backoff delay.
    Restarting,
    /// Child is not running and will not be restarted.
    Stopped,
    /// Child could not be started at all.
    Errored,
}

impl std::fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Online => "online",
            Self::Restarting => "restarting",
            Self::Stopped => "stopped",
            Self::Errored => "errored",
        };
        f.write_str(text)
    }
}

/// Snapshot of one supervised instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceRecord {
    /// Instance name (`<app>` or `<app>-<index>` when scaled out).
    pub name: String,
    /// Descriptor name this instance belongs to.
    pub app: String,
    /// OS process id while online.
    pub pid: Option<u32>,
    pub status: InstanceStatus,
    pub started_at: Option<DateTime<Utc>>,
    /// Times this instance has been respawned since `pmx start`.
    pub restarts: u32,
    /// Combined log file, the default target for `pmx logs`.
    pub log_file: PathBuf,
    pub out_file: PathBuf,
    pub error_file: PathBuf,
}

/// Reads and writes the `state.json` snapshot.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(paths: &Paths) -> Self {
        Self {
            path: paths.state_path(),
        }
    }

    /// Load all records. A missing snapshot is an empty map, not an error.
    pub fn load(&self) -> Result<BTreeMap<String, InstanceRecord>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(Error::State(format!(
                    "failed to read {}: {e}",
                    self.path.display()
                )));
            },
        };

        serde_json::from_str(&content)
            .map_err(|e| Error::State(format!("failed to parse {}: {e}", self.path.display())))
    }

    /// Replace the snapshot with the given records.
    ///
    /// Written atomically (temp file + rename) so `ps` never observes a
    /// half-written snapshot.
    pub fn save(&self, records: &BTreeMap<String, InstanceRecord>) -> Result<()> {
        let json = serde_json::to_string_pretty(records)
            .map_err(|e| Error::State(format!("failed to serialize state: {e}")))?;

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .map_err(|e| Error::State(format!("failed to write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            Error::State(format!("failed to replace {}: {e}", self.path.display()))
        })?;

        Ok(())
    }

    /// Remove the snapshot entirely. Idempotent.
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::State(format!(
                "failed to remove {}: {e}",
                self.path.display()
            ))),
        }
    }
}
