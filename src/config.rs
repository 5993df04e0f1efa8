use crate::error::{Result, SpdyError};
use std::time::Duration;

/// Configuration for a session.
///
/// # Examples
///
/// ```rust
/// use spdy_mux::{Config, ConfigBuilder};
/// use std::time::Duration;
///
/// let config = Config::default();
/// assert_eq!(config.stream_buffer, 1000);
///
/// let config = ConfigBuilder::new()
///     .ping_interval(Duration::from_secs(10))
///     .enable_ping(false)
///     .build()
///     .expect("valid configuration");
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Capacity of each stream's inbound frame queue, in frames.
    pub stream_buffer: usize,
    /// Capacity of the shared output mailbox, in frames.
    pub mailbox_buffer: usize,
    /// Cadence of the liveness ping loop.
    pub ping_interval: Duration,
    /// Whether to run the ping loop at all.
    pub enable_ping: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stream_buffer: 1000,
            mailbox_buffer: 4096,
            ping_interval: Duration::from_secs(30),
            enable_ping: true,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.stream_buffer == 0 {
            return Err(SpdyError::Protocol("stream buffer cannot be 0"));
        }
        if self.mailbox_buffer == 0 {
            return Err(SpdyError::Protocol("mailbox buffer cannot be 0"));
        }
        if self.enable_ping && self.ping_interval.is_zero() {
            return Err(SpdyError::Protocol("ping interval cannot be 0"));
        }
        Ok(())
    }
}

/// Builder for creating custom `Config` instances.
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn stream_buffer(mut self, frames: usize) -> Self {
        self.config.stream_buffer = frames;
        self
    }

    pub fn mailbox_buffer(mut self, frames: usize) -> Self {
        self.config.mailbox_buffer = frames;
        self
    }

    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.config.ping_interval = interval;
        self
    }

    pub fn enable_ping(mut self, enable: bool) -> Self {
        self.config.enable_ping = enable;
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
