//! Runtime configuration.
//!
//! Values come from environment variables (loaded via `dotenvy` at startup)
//! with sensible defaults; CLI flags override them. Configuration is
//! threaded through constructors — nothing reads the environment after
//! startup.

use std::env;
use std::time::Duration;

use crate::error::ConfigError;

/// Default time between polls for polling-based sources.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default render buffer capacity in display lines.
pub const DEFAULT_BUFFER_CAPACITY: usize = 100;

/// Default cap on a source's seen-message-id set before it is cleared.
pub const DEFAULT_SEEN_IDS_MAX: usize = 1000;

/// Default header width in columns.
pub const DEFAULT_HEADER_WIDTH: u16 = 80;

/// Aggregator configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Time between polls for HTTP and client-handle sources.
    pub poll_interval: Duration,
    /// Render buffer capacity (display lines).
    pub buffer_capacity: usize,
    /// Per-source seen-id cap; the set is cleared wholesale beyond this.
    pub seen_ids_max: usize,
    /// Header width in columns (clamped to the live terminal width).
    pub header_width: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            seen_ids_max: DEFAULT_SEEN_IDS_MAX,
            header_width: DEFAULT_HEADER_WIDTH,
        }
    }
}

impl Config {
    /// Build a config from the environment, falling back to defaults.
    ///
    /// Recognized variables:
    /// - `SIMULCHAT_POLL_INTERVAL_MS`
    /// - `SIMULCHAT_BUFFER_CAPACITY`
    /// - `SIMULCHAT_SEEN_IDS_MAX`
    /// - `SIMULCHAT_HEADER_WIDTH`
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(ms) = read_parsed::<u64>("SIMULCHAT_POLL_INTERVAL_MS")? {
            if ms == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "SIMULCHAT_POLL_INTERVAL_MS".to_string(),
                    message: "must be positive".to_string(),
                });
            }
            config.poll_interval = Duration::from_millis(ms);
        }

        if let Some(capacity) = read_parsed::<usize>("SIMULCHAT_BUFFER_CAPACITY")? {
            if capacity == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "SIMULCHAT_BUFFER_CAPACITY".to_string(),
                    message: "must be positive".to_string(),
                });
            }
            config.buffer_capacity = capacity;
        }

        if let Some(max) = read_parsed::<usize>("SIMULCHAT_SEEN_IDS_MAX")? {
            config.seen_ids_max = max;
        }

        if let Some(width) = read_parsed::<u16>("SIMULCHAT_HEADER_WIDTH")? {
            config.header_width = width;
        }

        Ok(config)
    }
}

/// Read and parse an env var; unset or empty means "use the default".
fn read_parsed<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse()
                .map(Some)
                .map_err(|_| ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("could not parse {:?}", raw),
                })
        }
        _ => Ok(None),
    }
}
