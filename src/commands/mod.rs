//! CLI command implementations for pmx.
//!
//! This module contains all the CLI command handlers that power the pmx CLI.
//! Each submodule implements a specific command:
//!
//! - [`start`] - Load an ecosystem file and supervise its apps
//! - [`check`] - Validate an ecosystem file without starting anything
//! - [`ps`] - List recorded instances and their liveness
//! - [`stop`] - Signal recorded instances to stop
//! - [`logs`] - Print the tail of an instance's log file

pub mod check;
pub mod logs;
pub mod ps;
pub mod start;
pub mod stop;

use anyhow::Result;
use std::path::Path;
use tracing::warn;

use crate::config::EcosystemFile;

/// Load an ecosystem file against the real environment and validate it,
/// logging non-fatal warnings.
pub fn load_validated(path: &Path) -> Result<EcosystemFile> {
    let file = EcosystemFile::load_from(path, |name| std::env::var(name).ok())?;

    let result = file.validate()?;
    for warning in &result.warnings {
        warn!("{warning}");
    }

    Ok(file)
}
