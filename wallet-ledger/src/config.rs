//! Configuration for the wallet ledger

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::types::ExchangeRate;

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for RocksDB
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Currency conversion
    pub exchange: ExchangeConfig,

    /// Transaction history listing
    pub history: HistoryConfig,

    /// RocksDB configuration
    pub rocksdb: RocksDBConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/wallet"),
            service_name: "wallet-ledger".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            exchange: ExchangeConfig::default(),
            history: HistoryConfig::default(),
            rocksdb: RocksDBConfig::default(),
        }
    }
}

/// Currency conversion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// Rupees credited per dollar topped up
    #[serde(with = "rust_decimal::serde::str")]
    pub usd_to_lkr: Decimal,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            usd_to_lkr: Decimal::from(ExchangeRate::DEFAULT_USD_TO_LKR),
        }
    }
}

/// Transaction history configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Upper bound on records returned by a paged listing
    pub max_page_size: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_page_size: 500 }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDBConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// fsync the WAL on every commit
    pub sync_writes: bool,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_background_jobs: 2,
            sync_writes: true,
            enable_statistics: false,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse from a TOML document
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("WALLET_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(rate) = std::env::var("WALLET_USD_TO_LKR") {
            config.exchange.usd_to_lkr = Decimal::from_str(rate.trim()).map_err(|e| {
                crate::Error::Config(format!("Invalid WALLET_USD_TO_LKR '{}': {}", rate, e))
            })?;
        }

        if let Ok(sync) = std::env::var("WALLET_SYNC_WRITES") {
            config.rocksdb.sync_writes = sync != "0" && !sync.eq_ignore_ascii_case("false");
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the ledger cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        self.exchange_rate()?;
        if self.history.max_page_size == 0 {
            return Err(crate::Error::Config(
                "history.max_page_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Configured conversion rate
    pub fn exchange_rate(&self) -> crate::Result<ExchangeRate> {
        ExchangeRate::new(self.exchange.usd_to_lkr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "wallet-ledger");
        assert_eq!(config.exchange.usd_to_lkr, Decimal::from(300));
        assert!(config.rocksdb.sync_writes);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_str() {
        let config = Config::from_toml_str(
            r#"
            data_dir = "/var/lib/wallet"
            service_name = "wallet-ledger"
            service_version = "0.1.0"

            [exchange]
            usd_to_lkr = "325.50"

            [history]
            max_page_size = 50

            [rocksdb]
            write_buffer_size_mb = 16
            max_background_jobs = 1
            sync_writes = false
            enable_statistics = false
            "#,
        )
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/var/lib/wallet"));
        assert_eq!(config.exchange.usd_to_lkr, Decimal::new(32550, 2));
        assert_eq!(config.history.max_page_size, 50);
        assert!(!config.rocksdb.sync_writes);
    }

    #[test]
    fn test_rejects_non_positive_rate() {
        let mut config = Config::default();
        config.exchange.usd_to_lkr = Decimal::ZERO;
        assert!(matches!(config.validate(), Err(crate::Error::Config(_))));
    }
}
