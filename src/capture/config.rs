//! Capture session configuration
//!
//! Defaults come from [`super::constants`], including their environment
//! overrides, so `SessionConfig::default()` reflects `SCREENSCOUT_*`
//! variables at the time it is built.

use std::time::Duration;

use super::constants;
use crate::util::encode::FrameEncoding;

/// Timing and export settings for one capture session
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use screenscout::{capture::SessionConfig, util::encode::FrameEncoding};
///
/// let config = SessionConfig::builder()
///     .poll_interval(Duration::from_millis(16))
///     .first_frame_timeout(Duration::from_secs(2))
///     .encoding(FrameEncoding::Png)
///     .build();
///
/// assert_eq!(config.poll_interval, Duration::from_millis(16));
/// assert_eq!(config.encoding, FrameEncoding::Png);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Frame period of the poll strategy
    pub poll_interval:       Duration,
    /// Wait after an iteration that produced no frame
    pub retry_backoff:       Duration,
    /// Bound on acquiring the first frame during start
    pub first_frame_timeout: Duration,
    /// How long one push acquisition blocks
    pub push_wait:           Duration,
    /// Bound on process/window enumeration
    pub resolve_timeout:     Duration,
    /// Format returned by `GetLatestFrame`
    pub encoding:            FrameEncoding,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval:       Duration::from_millis(constants::poll_interval_ms()),
            retry_backoff:       Duration::from_millis(constants::retry_backoff_ms()),
            first_frame_timeout: Duration::from_millis(constants::first_frame_timeout_ms()),
            push_wait:           Duration::from_millis(constants::push_wait_ms()),
            resolve_timeout:     Duration::from_millis(constants::resolve_timeout_ms()),
            encoding:            FrameEncoding::default(),
        }
    }
}

impl SessionConfig {
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder {
            config: SessionConfig::default(),
        }
    }
}

/// Builder for [`SessionConfig`]
#[derive(Debug, Clone)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.config.retry_backoff = backoff;
        self
    }

    pub fn first_frame_timeout(mut self, timeout: Duration) -> Self {
        self.config.first_frame_timeout = timeout;
        self
    }

    pub fn push_wait(mut self, wait: Duration) -> Self {
        self.config.push_wait = wait;
        self
    }

    pub fn resolve_timeout(mut self, timeout: Duration) -> Self {
        self.config.resolve_timeout = timeout;
        self
    }

    pub fn encoding(mut self, encoding: FrameEncoding) -> Self {
        self.config.encoding = encoding;
        self
    }

    pub fn build(self) -> SessionConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_uses_constants() {
        temp_env::with_vars_unset(
            ["SCREENSCOUT_POLL_INTERVAL_MS", "SCREENSCOUT_FIRST_FRAME_TIMEOUT_MS"],
            || {
                let config = SessionConfig::default();
                assert_eq!(config.poll_interval, Duration::from_millis(constants::POLL_INTERVAL_MS));
                assert_eq!(
                    config.first_frame_timeout,
                    Duration::from_millis(constants::FIRST_FRAME_TIMEOUT_MS)
                );
                assert_eq!(config.encoding, FrameEncoding::Bmp);
            },
        );
    }

    #[test]
    fn test_default_honours_env_override() {
        temp_env::with_var("SCREENSCOUT_RETRY_BACKOFF_MS", Some("250"), || {
            assert_eq!(SessionConfig::default().retry_backoff, Duration::from_millis(250));
        });
    }

    #[test]
    fn test_builder_overrides() {
        let config = SessionConfig::builder()
            .retry_backoff(Duration::from_millis(5))
            .push_wait(Duration::from_millis(7))
            .resolve_timeout(Duration::from_millis(9))
            .build();

        assert_eq!(config.retry_backoff, Duration::from_millis(5));
        assert_eq!(config.push_wait, Duration::from_millis(7));
        assert_eq!(config.resolve_timeout, Duration::from_millis(9));
    }
}
