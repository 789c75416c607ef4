//! `pmx start` - supervise the apps in an ecosystem file.

use anyhow::Result;
use std::path::Path;
use tracing::info;

use crate::paths::Paths;
use crate::supervisor::Supervisor;

/// Load, validate, and supervise until shutdown.
pub async fn execute(config_path: &Path) -> Result<()> {
    let file = super::load_validated(config_path)?;
    let paths = Paths::resolve()?;

    info!(
        config = %config_path.display(),
        apps = file.apps.len(),
        "Starting supervisor"
    );

    Supervisor::new(file, paths).run().await
}
