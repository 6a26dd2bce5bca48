//! Configuration for the credit ledger

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Credit ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// RocksDB configuration
    pub rocksdb: RocksDbConfig,

    /// Row lock configuration
    pub locks: LockConfig,

    /// Action cost configuration
    pub costs: CostConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/credit-ledger"),
            service_name: "credit-ledger".to_string(),
            rocksdb: RocksDbConfig::default(),
            locks: LockConfig::default(),
            costs: CostConfig::default(),
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDbConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            max_background_jobs: 4,
            enable_statistics: false,
        }
    }
}

/// Row lock configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// How long a unit of work may wait for a row lock before failing
    /// with a retryable LockTimeout (milliseconds)
    pub acquire_timeout_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            acquire_timeout_ms: 5_000,
        }
    }
}

/// Per-action credit cost table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostConfig {
    /// Cost charged when an action key is not configured
    pub default_cost: i64,

    /// Configured cost per action key
    #[serde(default)]
    pub action_costs: HashMap<String, i64>,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            default_cost: 1,
            action_costs: HashMap::new(),
        }
    }
}

impl CostConfig {
    /// Resolve the cost for an action key
    pub fn cost_for(&self, action_key: &str) -> i64 {
        self.action_costs
            .get(action_key)
            .copied()
            .unwrap_or(self.default_cost)
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("CREDIT_LEDGER_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(timeout) = std::env::var("CREDIT_LEDGER_LOCK_TIMEOUT_MS") {
            config.locks.acquire_timeout_ms = timeout
                .parse()
                .map_err(|e| crate::Error::Config(format!("Invalid lock timeout: {}", e)))?;
        }

        Ok(config)
    }
}
