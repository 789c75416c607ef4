//! UI utilities for consistent terminal output formatting.
//!
//! Provides shared formatting functions for error messages and the
//! `pmx ps` status table.

use chrono::{DateTime, Utc};

/// Width of error box separators.
const ERROR_BOX_WIDTH: usize = 60;

/// Print an error box with a title and optional detail text.
///
/// Formats errors consistently across the codebase with:
/// - A separator line of `=` characters
/// - The error title
/// - Another separator line
/// - Optional detail content
pub fn print_error_box(title: &str, detail: Option<&str>) {
    eprintln!("\n{}", "=".repeat(ERROR_BOX_WIDTH));
    eprintln!("{title}");
    eprintln!("{}", "=".repeat(ERROR_BOX_WIDTH));

    if let Some(detail) = detail
        && !detail.is_empty()
    {
        eprintln!("\n{detail}");
    }
}

/// One row of the `pmx ps` table.
#[derive(Debug)]
pub struct PsRow {
    pub name: String,
    pub app: String,
    pub pid: String,
    pub status: String,
    pub restarts: u32,
    pub uptime: String,
}

/// Render instance rows as a fixed-width table.
#[must_use]
pub fn render_ps_table(rows: &[PsRow]) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{:<20} {:<16} {:>8} {:<12} {:>8} {:>10}\n",
        "NAME", "APP", "PID", "STATUS", "RESTARTS", "UPTIME"
    ));

    for row in rows {
        out.push_str(&format!(
            "{:<20} {:<16} {:>8} {:<12} {:>8} {:>10}\n",
            row.name, row.app, row.pid, row.status, row.restarts, row.uptime
        ));
    }

    out
}

/// Compact uptime for the status table: `3s`, `5m`, `2h`, `4d`.
#[must_use]
pub fn format_uptime(since: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - since).num_seconds().max(0);

    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86_400 {
        format!("{}h", secs / 3600)
    } else {
        format!("{}d", secs / 86_400)
    }
}
