//! Typed errors for descriptor loading and process supervision.
//!
//! Core modules return [`Error`] so callers can distinguish configuration
//! mistakes from runtime failures; command handlers add `anyhow` context on
//! top and `main` maps the variant back to a CLI exit code.

use std::path::PathBuf;

/// Result type for pmx operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Supervisor errors with structured context.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Descriptor file failed to load or validate. Nothing spawns.
    #[error("configuration error: {0}")]
    Config(String),

    /// A child process could not be started.
    #[error("failed to spawn '{name}': {reason}")]
    Spawn { name: String, reason: String },

    /// Working directory missing or not a directory at spawn time.
    #[error("working directory for '{name}' does not exist: {cwd:?}")]
    MissingWorkdir { name: String, cwd: PathBuf },

    /// A supervised child exited when it was expected to keep running.
    #[error("process '{name}' exited unexpectedly ({status})")]
    UnexpectedExit { name: String, status: String },

    /// Resident memory crossed the configured ceiling.
    #[error("process '{name}' exceeded memory limit ({used} > {limit} bytes)")]
    MemoryLimit { name: String, used: u64, limit: u64 },

    /// A byte-quantity string such as `max_memory_restart` was malformed.
    #[error("invalid memory quantity '{0}' (expected forms like 512M or 1G)")]
    MemoryQuantity(String),

    /// State snapshot could not be read or written.
    #[error("state file error: {0}")]
    State(String),

    /// IO error with context.
    #[error("IO error in {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a spawn error.
    pub fn spawn(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Spawn {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an unexpected-exit error from a wait status.
    pub fn unexpected_exit(name: impl Into<String>, status: impl Into<String>) -> Self {
        Self::UnexpectedExit {
            name: name.into(),
            status: status.into(),
        }
    }
}

impl Error {
    /// Map the error to a CLI exit code.
    ///
    /// Configuration mistakes exit with 2 so scripts can tell "fix the
    /// file" apart from runtime failures (1).
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::MemoryQuantity(_) => 2,
            Self::Spawn { .. } | Self::MissingWorkdir { .. } => 3,
            Self::UnexpectedExit { .. }
            | Self::MemoryLimit { .. }
            | Self::State(_)
            | Self::Io { .. } => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(Error::config("bad").exit_code(), 2);
        assert_eq!(Error::MemoryQuantity("1X".into()).exit_code(), 2);
        assert_eq!(Error::spawn("web", "enoent").exit_code(), 3);
        assert_eq!(Error::unexpected_exit("web", "code 1").exit_code(), 1);
    }

    #[test]
    fn test_display_includes_name() {
        let err = Error::spawn("pocket-ai", "No such file or directory");
        assert!(err.to_string().contains("pocket-ai"));

        let err = Error::MemoryLimit {
            name: "pocket-ai".into(),
            used: 2_000_000_000,
            limit: 1_073_741_824,
        };
        assert!(err.to_string().contains("1073741824"));
    }
}
