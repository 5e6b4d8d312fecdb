//! Configuration for device sessions
//!
//! Loaded from a TOML file or built in code. Every field has a default, so an
//! empty file (or `SessionConfig::default()`) yields a loopback session.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default endpoint address
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:2000";

/// Default bytes per transport read, kept tiny for low input latency
pub const DEFAULT_CHUNK_SIZE: usize = 2;

/// Session configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Endpoint address as `host:port`
    pub address: String,

    /// Seconds to wait for each stage to stop during `close`
    pub timeout: f64,

    /// Seconds a distributor/writer stage blocks on its queue before
    /// re-checking the running flag
    pub poll_interval: f64,

    /// Maximum bytes requested per transport read
    pub chunk_size: usize,

    /// Capacity of each hand-off queue (absent = unbounded)
    pub queue_capacity: Option<usize>,

    /// Seconds allowed for the TCP connect (absent = OS default)
    pub connect_timeout: Option<f64>,

    /// Diagnostic logger settings
    pub debug: DebugConfig,
}

/// Diagnostic logger settings, forwarded verbatim to [`crate::debug::DebugLogger`]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Enable the RX/TX debug tap when the session is built
    pub debug_on: bool,
    /// Log file path or stem; setting it also enables the tap
    pub file_name: Option<String>,
    /// Minimum level (trace, debug, info, warn, error)
    pub level: String,
    /// Include `[LEVEL]` in each entry
    pub show_level: bool,
    /// Include the thread name
    pub show_thread: bool,
    /// Include the module path
    pub show_module: bool,
    /// Include the calling method (topic source)
    pub show_method: bool,
    /// Append `_YYYYmmddHHMMSS` to the log file name
    pub date_filename: bool,
    /// Mirror entries through the `log` facade
    pub console_output: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            timeout: 4.0,
            poll_interval: 1.0,
            chunk_size: DEFAULT_CHUNK_SIZE,
            queue_capacity: None,
            connect_timeout: None,
            debug: DebugConfig::default(),
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            debug_on: false,
            file_name: None,
            level: "debug".to_string(),
            show_level: true,
            show_thread: true,
            show_module: true,
            show_method: true,
            date_filename: true,
            console_output: true,
        }
    }
}

impl SessionConfig {
    /// Config pointing at `address` with every other field defaulted
    pub fn with_address(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    /// Load configuration from TOML file
    ///
    /// # Example
    /// ```no_run
    /// use setu_io::config::SessionConfig;
    ///
    /// let config = SessionConfig::from_file("setu.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: SessionConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be at least 1".to_string()));
        }
        check_seconds("timeout", self.timeout)?;
        check_seconds("poll_interval", self.poll_interval)?;
        if let Some(secs) = self.connect_timeout {
            check_seconds("connect_timeout", secs)?;
        }
        if self.queue_capacity == Some(0) {
            return Err(Error::Config("queue_capacity must be at least 1".to_string()));
        }
        self.debug.level_filter()?;
        Ok(())
    }

    /// Close timeout as a `Duration`
    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout)
    }

    /// Queue poll interval as a `Duration`
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval)
    }

    /// Connect timeout as a `Duration`, if configured
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout.map(Duration::from_secs_f64)
    }
}

/// Seconds must be positive and fit in a `Duration`
fn check_seconds(field: &str, secs: f64) -> Result<()> {
    if secs > 0.0 && Duration::try_from_secs_f64(secs).is_ok() {
        Ok(())
    } else {
        Err(Error::Config(format!("{} must be positive, got {}", field, secs)))
    }
}

impl DebugConfig {
    /// Whether these settings ask for the debug tap to be switched on
    pub fn wants_tap(&self) -> bool {
        self.debug_on || self.file_name.is_some()
    }

    /// Parse `level` into a `log` filter
    pub fn level_filter(&self) -> Result<log::LevelFilter> {
        self.level
            .parse::<log::LevelFilter>()
            .map_err(|_| Error::Config(format!("unknown log level '{}'", self.level)))
    }
}
