//! Server Configuration
//!
//! A plain struct with defaults, plus a builder for overriding individual
//! settings. The binary fills it from command-line flags.

use crate::connection::Timeouts;
use crate::storage::DEFAULT_SWEEP_INTERVAL;
use std::time::Duration;

/// The default port (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// Largest admission limit; the drain acquires every slot in one `u32` call.
pub const MAX_CLIENTS_LIMIT: usize = u32::MAX as usize;

/// Runtime configuration for a server instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// TCP listen address (host:port)
    pub addr: String,

    /// Default log filter, used when `RUST_LOG` is not set
    pub log_level: String,

    /// Maximum number of concurrent client sessions. Further clients wait
    /// for a free slot.
    pub max_clients: usize,

    /// Period of the background expiry sweep
    pub sweep_interval: Duration,

    /// Per-read deadline. `None` keeps idle clients connected indefinitely.
    pub read_timeout: Option<Duration>,

    /// Per-reply write deadline. `None` lets a client that stops reading
    /// hold its slot until it disconnects.
    pub write_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: format!("0.0.0.0:{}", DEFAULT_PORT),
            log_level: "info".to_string(),
            max_clients: 100,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// The session deadlines derived from this config.
    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            read: self.read_timeout,
            write: self.write_timeout,
        }
    }
}

/// Builder for Config
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn addr(mut self, addr: impl Into<String>) -> Self {
        self.config.addr = addr.into();
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.log_level = level.into();
        self
    }

    /// Set the admission limit, clamped to `1..=MAX_CLIENTS_LIMIT`.
    pub fn max_clients(mut self, count: usize) -> Self {
        self.config.max_clients = count.clamp(1, MAX_CLIENTS_LIMIT);
        self
    }

    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.config.sweep_interval = interval;
        self
    }

    pub fn read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    pub fn write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.write_timeout = timeout;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
