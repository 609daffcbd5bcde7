//! Configuration for needlestore
//!
//! Centralized volume configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{NeedleError, Result};

/// Main configuration for a volume
#[derive(Debug, Clone)]
pub struct VolumeConfig {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for the volume's files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── volume.dat       (append-only needle data)
    ///     └── volume.idx       (index snapshot)
    pub data_dir: PathBuf,

    /// Explicit index snapshot path; `None` means `{data_dir}/volume.idx`
    pub index_path: Option<PathBuf>,

    /// When to fsync the data file
    pub data_sync: DataSyncStrategy,

    // -------------------------------------------------------------------------
    // Index Configuration
    // -------------------------------------------------------------------------
    /// When to persist the index
    pub save_strategy: IndexSaveStrategy,

    // -------------------------------------------------------------------------
    // Recovery Configuration
    // -------------------------------------------------------------------------
    /// Cut unparseable trailing bytes off the store at open, so later
    /// appends do not land behind them. Off by default: a corrupt header in
    /// the middle of the store would take every record after it along.
    pub truncate_torn_tail: bool,

    // -------------------------------------------------------------------------
    // Limits
    // -------------------------------------------------------------------------
    /// Largest payload `put` accepts (in bytes)
    pub max_payload_size: usize,
}

/// Index persistence strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexSaveStrategy {
    /// Persist inside every put/delete before it returns (safest)
    EveryWrite,

    /// Mark the index dirty and let a background thread persist it at most
    /// once per interval. Lost saves are healed by the recovery scan.
    Interval(Duration),
}

/// Data file fsync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSyncStrategy {
    /// fsync after every append and flag rewrite
    EveryWrite,

    /// Only fsync on `flush`/`close`
    Manual,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./needlestore_data"),
            index_path: None,
            data_sync: DataSyncStrategy::EveryWrite,
            save_strategy: IndexSaveStrategy::EveryWrite,
            truncate_torn_tail: false,
            max_payload_size: 64 * 1024 * 1024, // 64 MB
        }
    }
}

impl VolumeConfig {
    const DATA_FILENAME: &'static str = "volume.dat";
    const INDEX_FILENAME: &'static str = "volume.idx";

    /// Create a new config builder
    pub fn builder() -> VolumeConfigBuilder {
        VolumeConfigBuilder::default()
    }

    /// Path of the data file
    pub fn data_path(&self) -> PathBuf {
        self.data_dir.join(Self::DATA_FILENAME)
    }

    /// Path of the index snapshot
    pub fn index_path(&self) -> PathBuf {
        self.index_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join(Self::INDEX_FILENAME))
    }

    /// Reject settings the volume cannot run with
    pub fn validate(&self) -> Result<()> {
        if let IndexSaveStrategy::Interval(interval) = self.save_strategy {
            if interval.is_zero() {
                return Err(NeedleError::Config(
                    "index save interval must be non-zero".to_string(),
                ));
            }
        }

        if self.max_payload_size == 0 {
            return Err(NeedleError::Config(
                "max_payload_size must be non-zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for VolumeConfig
#[derive(Default)]
pub struct VolumeConfigBuilder {
    config: VolumeConfig,
}

impl VolumeConfigBuilder {
    /// Set the data directory (root for all volume files)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Put the index snapshot somewhere other than the data directory
    pub fn index_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.index_path = Some(path.into());
        self
    }

    /// Set the data file sync strategy
    pub fn data_sync(mut self, strategy: DataSyncStrategy) -> Self {
        self.config.data_sync = strategy;
        self
    }

    /// Set the index save strategy
    pub fn save_strategy(mut self, strategy: IndexSaveStrategy) -> Self {
        self.config.save_strategy = strategy;
        self
    }

    /// Shorthand for `IndexSaveStrategy::Interval`
    pub fn save_interval(self, interval: Duration) -> Self {
        self.save_strategy(IndexSaveStrategy::Interval(interval))
    }

    /// Truncate a torn tail during recovery
    pub fn truncate_torn_tail(mut self, enabled: bool) -> Self {
        self.config.truncate_torn_tail = enabled;
        self
    }

    /// Set the maximum payload size (in bytes)
    pub fn max_payload_size(mut self, size: usize) -> Self {
        self.config.max_payload_size = size;
        self
    }

    pub fn build(self) -> VolumeConfig {
        self.config
    }
}
