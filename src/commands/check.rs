//! `pmx check` - validate an ecosystem file without starting anything.

use anyhow::Result;
use std::path::Path;

use crate::config::EcosystemFile;

pub fn execute(config_path: &Path) -> Result<()> {
    let file = EcosystemFile::load_from(config_path, |name| std::env::var(name).ok())?;
    let result = file.validate()?;

    for warning in &result.warnings {
        println!("Warning: {warning}");
    }

    let count = file.apps.len();
    let plural = if count == 1 { "" } else { "s" };
    println!("Configuration OK: {count} app{plural}");
    Ok(())
}
