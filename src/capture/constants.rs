//! Centralized timing constants for capture sessions.
//!
//! # Runtime Configuration
//!
//! Every value can be overridden at runtime via an environment variable:
//!
//! | Environment Variable | Default | Description |
//! |---------------------|---------|-------------|
//! | `SCREENSCOUT_POLL_INTERVAL_MS` | 33 | Poll strategy frame period |
//! | `SCREENSCOUT_RETRY_BACKOFF_MS` | 100 | Wait after a failed acquisition |
//! | `SCREENSCOUT_FIRST_FRAME_TIMEOUT_MS` | 1000 | Bound on session start |
//! | `SCREENSCOUT_PUSH_WAIT_MS` | 100 | Push strategy wait slice |
//! | `SCREENSCOUT_RESOLVE_TIMEOUT_MS` | 1500 | Process/window enumeration |
//!
//! Unparsable values fall back to the default.

/// Frame period of the poll strategy (about 30 frames per second).
///
/// An iteration that overruns the period skips its sleep instead of dropping
/// the next frame.
pub const POLL_INTERVAL_MS: u64 = 33;

/// Wait before retrying after an iteration produced no frame.
///
/// Covers minimized windows, zero-sized client areas and windows destroyed
/// mid-capture.
pub const RETRY_BACKOFF_MS: u64 = 100;

/// Upper bound on waiting for the first frame while a session starts.
///
/// Past this bound the start fails and every acquired resource is released.
pub const FIRST_FRAME_TIMEOUT_MS: u64 = 1000;

/// How long one push-strategy acquisition blocks waiting for the compositor.
///
/// Also bounds how long the worker takes to notice a stop request.
pub const PUSH_WAIT_MS: u64 = 100;

/// Timeout for process and window enumeration during target resolution.
pub const RESOLVE_TIMEOUT_MS: u64 = 1500;

// =============================================================================
// Environment Variable Overrides
// =============================================================================

fn get_timeout_from_env(env_var: &str, default: u64) -> u64 {
    std::env::var(env_var)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Override with: `SCREENSCOUT_POLL_INTERVAL_MS`
pub fn poll_interval_ms() -> u64 {
    get_timeout_from_env("SCREENSCOUT_POLL_INTERVAL_MS", POLL_INTERVAL_MS)
}

/// Override with: `SCREENSCOUT_RETRY_BACKOFF_MS`
pub fn retry_backoff_ms() -> u64 {
    get_timeout_from_env("SCREENSCOUT_RETRY_BACKOFF_MS", RETRY_BACKOFF_MS)
}

/// Get the first-frame timeout, checking environment variable override.
///
/// Override with: `SCREENSCOUT_FIRST_FRAME_TIMEOUT_MS`
///
/// # Example
///
/// ```bash
/// # Give slow GPUs more time to deliver the first frame
/// export SCREENSCOUT_FIRST_FRAME_TIMEOUT_MS=3000
/// ```
pub fn first_frame_timeout_ms() -> u64 {
    get_timeout_from_env("SCREENSCOUT_FIRST_FRAME_TIMEOUT_MS", FIRST_FRAME_TIMEOUT_MS)
}

/// Override with: `SCREENSCOUT_PUSH_WAIT_MS`
pub fn push_wait_ms() -> u64 {
    get_timeout_from_env("SCREENSCOUT_PUSH_WAIT_MS", PUSH_WAIT_MS)
}

/// Override with: `SCREENSCOUT_RESOLVE_TIMEOUT_MS`
pub fn resolve_timeout_ms() -> u64 {
    get_timeout_from_env("SCREENSCOUT_RESOLVE_TIMEOUT_MS", RESOLVE_TIMEOUT_MS)
}
