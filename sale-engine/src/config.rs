//! Configuration for the sale engine

use credit_ledger::{LockConfig, RocksDbConfig};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Sale engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// RocksDB configuration
    pub rocksdb: RocksDbConfig,

    /// Row lock configuration
    pub locks: LockConfig,

    /// Sale processing configuration
    pub sale: SaleConfig,

    /// Platform fee configuration
    pub fees: FeeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/sale-engine"),
            rocksdb: RocksDbConfig::default(),
            locks: LockConfig::default(),
            sale: SaleConfig::default(),
            fees: FeeConfig::default(),
        }
    }
}

/// Sale processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleConfig {
    /// Prefix on generated transaction numbers
    pub transaction_prefix: String,

    /// Tax rate applied to subtotals
    pub tax_rate: Decimal,

    /// Loyalty points accrued per whole currency unit spent
    pub loyalty_points_per_unit: i64,
}

impl Default for SaleConfig {
    fn default() -> Self {
        Self {
            transaction_prefix: "TXN".to_string(),
            // No tax by default; deployments set their own rate
            tax_rate: Decimal::ZERO,
            loyalty_points_per_unit: 1,
        }
    }
}

/// Platform fee configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    /// Fraction of each sale total collected as a platform fee
    pub platform_rate: Decimal,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            // 2% platform fee
            platform_rate: Decimal::new(2, 2),
        }
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

        if let Ok(data_dir) = std::env::var("SALE_ENGINE_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(prefix) = std::env::var("SALE_ENGINE_TXN_PREFIX") {
            config.sale.transaction_prefix = prefix;
        }

        if let Ok(rate) = std::env::var("SALE_ENGINE_PLATFORM_RATE") {
            config.fees.platform_rate = rate
                .parse()
                .map_err(|e| crate::Error::Config(format!("Invalid platform rate: {}", e)))?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sale.transaction_prefix, "TXN");
        assert_eq!(config.fees.platform_rate, Decimal::new(2, 2));
        assert_eq!(config.locks.acquire_timeout_ms, 5_000);
    }
}
