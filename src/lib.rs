//! # pmx
//!
//! pmx is a small process supervisor driven by a declarative "ecosystem"
//! descriptor file. Each descriptor names a script to run, where to run it,
//! and how to keep it alive: restart policy, memory ceiling, log redirection,
//! and optional filesystem watching.
//!
//! The crate is split into:
//!
//! - [`config`] - descriptor schema, file loading, and validation
//! - [`supervisor`] - spawning, monitoring, restart/backoff, log capture
//! - [`state`] - on-disk instance records consumed by `ps`/`stop`/`logs`
//! - [`commands`] - CLI command handlers
//! - [`paths`] - `~/.pmx` layout resolution
//! - [`error`] - typed error taxonomy with CLI exit-code mapping

#![deny(unsafe_code)]

pub mod commands;
pub mod config;
pub mod constants;
pub mod error;
pub mod paths;
pub mod state;
pub mod supervisor;
pub mod ui;
pub mod utils;

pub use config::{EcosystemFile, ProcessDescriptor};
pub use error::{Error, Result};
pub use supervisor::{Supervisor, SupervisorConfig, SupervisorHandle};
