//! Driver configuration
//!
//! All timing knobs of the drive loop live here, in milliseconds so the
//! struct serializes cleanly. The defaults match the firmware's behaviour at
//! 9600 baud.

use std::path::Path;
use std::time::Duration;

use korad_detect::ProbeConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;

/// Drive loop and discovery configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// How long an idle tick waits for a command to be queued (ms)
    pub idle_wait_ms: u64,
    /// Bound on a single reply read (ms)
    pub read_timeout_ms: u64,
    /// Bound on writing one command (ms)
    pub write_timeout_ms: u64,
    /// How long to wait for the extra byte some replies carry (ms)
    pub quirk_drain_timeout_ms: u64,
    /// Consecutive ticks without progress before `drive` returns
    pub idle_tick_limit: u32,
    /// Receive buffer capacity in bytes
    pub receive_buffer_size: usize,
    /// Identification handshake settings
    pub probe: ProbeConfig,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            idle_wait_ms: 500,
            read_timeout_ms: 500,
            write_timeout_ms: 500,
            quirk_drain_timeout_ms: 100,
            idle_tick_limit: 20,
            receive_buffer_size: 1024,
            probe: ProbeConfig::default(),
        }
    }
}

impl DriverConfig {
    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn quirk_drain_timeout(&self) -> Duration {
        Duration::from_millis(self.quirk_drain_timeout_ms)
    }

    /// Load a configuration from a JSON file
    ///
    /// Missing fields take their default values.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        debug!("Loaded driver config from {}", path.display());
        Ok(serde_json::from_str(&json)?)
    }

    /// Save the configuration as pretty-printed JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let io_error = |source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }

        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(io_error)?;
        debug!("Saved driver config to {}", path.display());
        Ok(())
    }
}
