//! Shared defaults for the supervisor runtime.

use std::time::Duration;

/// Initial delay before the first restart attempt.
pub const RESTART_INITIAL_DELAY: Duration = Duration::from_millis(500);

/// Upper bound on the delay between restart attempts.
pub const RESTART_MAX_DELAY: Duration = Duration::from_secs(30);

/// Multiplier applied to the restart delay after each failed attempt.
pub const RESTART_FACTOR: f32 = 2.0;

/// Uptime after which an instance is considered stable and its
/// restart backoff resets.
pub const STABLE_UPTIME: Duration = Duration::from_secs(30);

/// Grace period between SIGTERM and SIGKILL when stopping a child.
pub const KILL_GRACE: Duration = Duration::from_secs(5);

/// Interval between resident-memory samples when a descriptor sets
/// `max_memory_restart`.
pub const MEMORY_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Quiet window for collapsing bursts of filesystem events into a
/// single watch-triggered restart.
pub const WATCH_DEBOUNCE: Duration = Duration::from_millis(500);

/// Default number of lines printed by `pmx logs`.
pub const DEFAULT_LOG_LINES: usize = 20;
