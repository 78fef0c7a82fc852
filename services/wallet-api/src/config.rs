use config::{ConfigError, Environment};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ApiConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub ledger: LedgerSettings,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
}

#[derive(Deserialize, Serialize, Clone)]
pub struct AuthConfig {
    /// HS256 secret shared with the identity provider
    pub jwt_secret: String,
}

// Keep the secret out of logs
impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LedgerSettings {
    pub data_dir: PathBuf,
    pub usd_to_lkr: Decimal,
    pub sync_writes: bool,
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            // Server defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 5000)?
            .set_default("server.workers", 4)?
            // Ledger defaults
            .set_default("ledger.data_dir", "./data/wallet")?
            .set_default("ledger.usd_to_lkr", "300")?
            .set_default("ledger.sync_writes", true)?;

        builder = builder.add_source(Environment::with_prefix("WALLET_API").separator("__"));

        // Override from environment variables
        if let Ok(port) = env::var("PORT") {
            builder = builder.set_override("server.port", port)?;
        }

        if let Ok(secret) = env::var("JWT_SECRET") {
            builder = builder.set_override("auth.jwt_secret", secret)?;
        }

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.jwt_secret.trim().is_empty() {
            return Err(ConfigError::Message(
                "auth.jwt_secret (JWT_SECRET) must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Settings for the embedded ledger
    pub fn ledger_config(&self) -> wallet_ledger::Config {
        let mut config = wallet_ledger::Config::default();
        config.data_dir = self.ledger.data_dir.clone();
        config.exchange.usd_to_lkr = self.ledger.usd_to_lkr;
        config.rocksdb.sync_writes = self.ledger.sync_writes;
        config
    }
}
