//! `pmx logs` - print the tail of an instance's combined log.

use anyhow::{Result, bail};

use crate::paths::Paths;
use crate::state::StateStore;
use crate::supervisor::logs::tail_log;

/// Print the last `lines` lines for an instance (or an app's first
/// instance when given the app name).
pub fn execute(name: &str, lines: usize) -> Result<()> {
    let paths = Paths::resolve()?;
    let records = StateStore::new(&paths).load()?;

    let record = records
        .get(name)
        .or_else(|| records.values().find(|record| record.app == name));

    let Some(record) = record else {
        bail!("no recorded instance or app named '{name}'");
    };

    for line in tail_log(&record.log_file, lines)? {
        println!("{line}");
    }
    Ok(())
}
