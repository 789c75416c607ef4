//! Path layout for pmx runtime files.
//!
//! Everything pmx writes lives under one base directory:
//!
//! - `<base>/state.json` - instance records consumed by `ps`/`stop`/`logs`
//! - `<base>/pids/<instance>.pid` - pid file per supervised instance
//! - `<base>/logs/<instance>.log` - fallback log files for descriptors
//!   that do not set explicit `out_file`/`error_file`/`log_file` paths
//!
//! The base resolves to `PMX_HOME` when set, `~/.pmx` otherwise. Commands
//! and the supervisor receive a [`Paths`] value instead of reading the
//! environment themselves, so tests can point everything at a temp dir.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Resolved base directory for pmx runtime files.
#[derive(Debug, Clone)]
pub struct Paths {
    base: PathBuf,
}

impl Paths {
    /// Resolve the base directory from the environment.
    ///
    /// Resolution order:
    /// 1. `PMX_HOME` environment variable (if set and non-empty)
    /// 2. `~/.pmx/` (default)
    pub fn resolve() -> Result<Self> {
        if let Ok(home) = std::env::var("PMX_HOME")
            && !home.is_empty()
        {
            return Ok(Self {
                base: PathBuf::from(home),
            });
        }

        let home = dirs::home_dir().context("Failed to get home directory")?;
        Ok(Self {
            base: home.join(".pmx"),
        })
    }

    /// Use an explicit base directory. Intended for tests.
    pub fn at(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// The base directory itself.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// State snapshot path: `<base>/state.json`
    pub fn state_path(&self) -> PathBuf {
        self.base.join("state.json")
    }

    /// Pid file for a specific instance: `<base>/pids/<instance>.pid`
    pub fn pid_path(&self, instance: &str) -> PathBuf {
        self.base.join("pids").join(format!("{instance}.pid"))
    }

    /// Fallback log directory: `<base>/logs/`
    pub fn logs_dir(&self) -> PathBuf {
        self.base.join("logs")
    }

    /// Fallback log file for an instance: `<base>/logs/<instance>.log`
    pub fn log_path(&self, instance: &str) -> PathBuf {
        self.logs_dir().join(format!("{instance}.log"))
    }

    /// Create the directory layout if it does not exist yet.
    pub fn ensure_layout(&self) -> Result<()> {
        for dir in [self.base.clone(), self.base.join("pids"), self.logs_dir()] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
        Ok(())
    }
}
