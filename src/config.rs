//! Configuration for logvault
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, VaultError};

/// Main configuration for a logvault instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory holding the segment files and the `LOCK` file
    pub data_dir: PathBuf,

    /// Sync strategy: how often to fsync the active segment
    pub sync_strategy: SyncStrategy,

    // -------------------------------------------------------------------------
    // Segment Configuration
    // -------------------------------------------------------------------------
    /// Roll the active segment once it grows past this many bytes
    pub segment_max_bytes: u64,

    /// Roll the active segment once it has been open this long
    pub segment_interval: Duration,

    // -------------------------------------------------------------------------
    // Compaction Configuration
    // -------------------------------------------------------------------------
    /// Interval between background compaction cycles
    pub compaction_interval: Duration,

    /// Run the background compactor (manual `Engine::compact` always works)
    pub background_compaction: bool,
}

/// Active segment sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N unsynced writes.
    ///
    /// Each record is written to the OS before the indexes see it, but the
    /// indexes are updated before the fsync. A reader can therefore get a
    /// value that a power loss would still take away; up to `count - 1`
    /// acknowledged writes are lost in that case. A process crash alone loses
    /// nothing. Use `EveryWrite` when a read must imply durability.
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./logvault_data"),
            sync_strategy: SyncStrategy::EveryWrite,
            segment_max_bytes: 1024 * 1024,                  // 1 MB
            segment_interval: Duration::from_secs(60 * 60),  // 1 hour
            compaction_interval: Duration::from_secs(24 * 60 * 60), // 1 day
            background_compaction: true,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.segment_max_bytes == 0 {
            return Err(VaultError::Config(
                "segment_max_bytes must be greater than zero".to_string(),
            ));
        }
        if self.background_compaction && self.compaction_interval.is_zero() {
            return Err(VaultError::Config(
                "compaction_interval must be non-zero when background compaction is enabled"
                    .to_string(),
            ));
        }
        if let SyncStrategy::EveryNEntries { count: 0 } = self.sync_strategy {
            return Err(VaultError::Config(
                "EveryNEntries sync count must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the segment size threshold (in bytes)
    pub fn segment_max_bytes(mut self, size: u64) -> Self {
        self.config.segment_max_bytes = size;
        self
    }

    /// Set the segment age threshold
    pub fn segment_interval(mut self, interval: Duration) -> Self {
        self.config.segment_interval = interval;
        self
    }

    /// Set the background compaction interval
    pub fn compaction_interval(mut self, interval: Duration) -> Self {
        self.config.compaction_interval = interval;
        self
    }

    /// Enable or disable the background compactor
    pub fn background_compaction(mut self, enabled: bool) -> Self {
        self.config.background_compaction = enabled;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
