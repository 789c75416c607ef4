//! `pmx ps` - list recorded instances.
//!
//! Reads the state snapshot and cross-checks each recorded pid against
//! the OS process table, so instances whose supervisor died hard show up
//! as `dead` instead of a stale `online`.

use anyhow::Result;
use chrono::Utc;

use crate::paths::Paths;
use crate::state::{InstanceStatus, StateStore};
use crate::supervisor::health;
use crate::ui::{PsRow, render_ps_table};

pub fn execute() -> Result<()> {
    let paths = Paths::resolve()?;
    let records = StateStore::new(&paths).load()?;

    if records.is_empty() {
        println!("No pmx instances recorded.");
        return Ok(());
    }

    let now = Utc::now();
    let rows: Vec<PsRow> = records
        .values()
        .map(|record| {
            let alive = record.pid.is_some_and(health::is_running);
            let status = match (record.status, alive) {
                (InstanceStatus::Online, false) => "dead".to_string(),
                (status, _) => status.to_string(),
            };
            let uptime = match (record.status, record.started_at, alive) {
                (InstanceStatus::Online, Some(since), true) => {
                    crate::ui::format_uptime(since, now)
                },
                _ => "-".to_string(),
            };

            PsRow {
                name: record.name.clone(),
                app: record.app.clone(),
                pid: record
                    .pid
                    .map_or_else(|| "-".to_string(), |pid| pid.to_string()),
                status,
                restarts: record.restarts,
                uptime,
            }
        })
        .collect();

    print!("{}", render_ps_table(&rows));
    Ok(())
}
