//! Log capture for supervised children.
//!
//! Each child gets its stdout and stderr piped back into the supervisor.
//! A pump task per stream appends every line to that stream's file and to
//! the app's combined file, optionally prefixed with a capture timestamp.
//! Files are opened create-or-append so restarts keep accumulating into
//! the same logs.

use anyhow::{Context, Result};
use chrono::Local;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader as AsyncBufReader};
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::ProcessDescriptor;
use crate::paths::Paths;

/// Resolved log destinations for one instance.
#[derive(Debug, Clone, PartialEq)]
pub struct LogPaths {
    pub out: PathBuf,
    pub error: PathBuf,
    pub combined: PathBuf,
}

impl LogPaths {
    /// Resolve destinations for instance `index` of a descriptor.
    ///
    /// Descriptor paths are used as-is for a single instance; with
    /// `instances > 1` each file gets an `-<index>` suffix so copies do
    /// not interleave. Omitted paths fall back to per-instance files
    /// under the pmx log directory.
    #[must_use]
    pub fn for_instance(
        descriptor: &ProcessDescriptor,
        paths: &Paths,
        instance: &str,
        index: usize,
        scaled: bool,
    ) -> Self {
        let fallback = |suffix: &str| paths.log_path(&format!("{instance}{suffix}"));

        let pick = |configured: &Option<PathBuf>, suffix: &str| match configured {
            Some(path) if scaled => indexed_path(path, index),
            Some(path) => path.clone(),
            None => fallback(suffix),
        };

        Self {
            out: pick(&descriptor.out_file, "-out"),
            error: pick(&descriptor.error_file, "-error"),
            combined: pick(&descriptor.log_file, ""),
        }
    }
}

/// Insert `-<index>` before the file extension: `out.log` -> `out-1.log`.
fn indexed_path(path: &Path, index: usize) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}-{index}.{}", ext.to_string_lossy()),
        None => format!("{stem}-{index}"),
    };
    path.with_file_name(name)
}

/// Open a log file for appending, creating parent directories as needed.
pub async fn open_append(path: &Path) -> Result<tokio::fs::File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
    }

    tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("Failed to open log file: {}", path.display()))
}

/// Append target for one child stream plus the shared combined file.
pub struct LogSink {
    stream: tokio::fs::File,
    combined: Arc<Mutex<tokio::fs::File>>,
    timestamp: bool,
}

impl LogSink {
    pub async fn open(
        stream_path: &Path,
        combined: Arc<Mutex<tokio::fs::File>>,
        timestamp: bool,
    ) -> Result<Self> {
        Ok(Self {
            stream: open_append(stream_path).await?,
            combined,
            timestamp,
        })
    }

    /// Append one captured line to the stream file and the combined file.
    pub async fn write_line(&mut self, line: &str) -> Result<()> {
        let rendered = if self.timestamp {
            format!("{}: {line}\n", Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"))
        } else {
            format!("{line}\n")
        };

        self.stream
            .write_all(rendered.as_bytes())
            .await
            .context("Failed to write stream log")?;

        let mut combined = self.combined.lock().await;
        combined
            .write_all(rendered.as_bytes())
            .await
            .context("Failed to write combined log")?;

        Ok(())
    }
}

/// Copy lines from a child stream into a sink until the stream closes.
pub async fn pump_stream<R>(reader: R, mut sink: LogSink, instance: String, stream: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut lines = AsyncBufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if let Err(e) = sink.write_line(&line).await {
                    debug!(instance = %instance, stream, error = %e, "Dropping log line");
                }
            },
            Ok(None) => break,
            Err(e) => {
                debug!(instance = %instance, stream, error = %e, "Log stream read failed");
                break;
            },
        }
    }
}

/// Reads the last N lines from a log file (oldest of the N first).
pub fn tail_log(log_path: &Path, lines: usize) -> Result<Vec<String>> {
    let file = File::open(log_path)
        .with_context(|| format!("Failed to open log file: {}", log_path.display()))?;

    let reader = BufReader::new(file);
    let all_lines: Vec<String> = reader
        .lines()
        .collect::<std::io::Result<_>>()
        .context("Failed to read log file")?;

    let start = all_lines.len().saturating_sub(lines);
    Ok(all_lines[start..].to_vec())
}
