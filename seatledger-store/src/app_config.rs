use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub redis: RedisConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Redis,
    Postgres,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Key prefix for the Redis backend, so several ledgers can share one
    /// Redis database.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// JSON array of flights inserted at startup when not already present.
    pub seed_path: Option<String>,
}

fn default_namespace() -> String {
    "seatledger".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    #[serde(default = "default_cancel_attempts")]
    pub max_cancel_attempts: u32,
}

fn default_cancel_attempts() -> u32 {
    seatledger_core::ledger::DEFAULT_MAX_CANCEL_ATTEMPTS
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_cancel_attempts: default_cancel_attempts(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides are optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg.. `SEATLEDGER__SERVER__PORT=9000` sets `server.port`
            .add_source(config::Environment::with_prefix("SEATLEDGER").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [server]
            port = 8080

            [store]
            backend = "redis"

            [redis]
            url = "redis://127.0.0.1/"

            [database]
            url = "postgres://localhost/seatledger"
        "#;

        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.store.backend, StoreBackend::Redis);
        assert_eq!(config.store.namespace, "seatledger");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.ledger.max_cancel_attempts, 3);
        assert!(config.store.seed_path.is_none());
    }
}
