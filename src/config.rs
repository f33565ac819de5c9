//! Configuration management with validation and defaults
//!
//! Settings load from an optional TOML file, are overridden by `RAFFLE_*`
//! environment variables, and are validated before an engine is built.

use crate::errors::{ConfigurationError, RaffleResult};
use crate::types::Amount;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Top-level raffle configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct RaffleConfig {
    pub raffle: RaffleSettings,
    pub oracle: OracleConfig,
    pub keeper: KeeperConfig,
    pub monitoring: MonitoringConfig,
}

/// Immutable round parameters
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RaffleSettings {
    /// Exact fee for one entrant slot
    pub entry_fee: Amount,
    /// Minimum time a round stays open before it can settle
    pub interval_secs: u64,
}

impl Default for RaffleSettings {
    fn default() -> Self {
        Self {
            entry_fee: 10_000_000_000_000_000, // 0.01 in 18-decimal units
            interval_secs: 30,
        }
    }
}

/// Parameters forwarded with every randomness request
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct OracleConfig {
    /// Hex-encoded 32-byte key hash (gas lane) selecting the oracle job
    pub key_hash: String,
    pub subscription_id: u64,
    pub request_confirmations: u16,
    pub callback_gas_limit: u32,
    pub num_words: u32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            key_hash: "d89b2bf150e3b9e13446986e571fb9cab24b13cea0a43ea20a6049a85cc807cc".to_string(),
            subscription_id: 1,
            request_confirmations: 3,
            callback_gas_limit: 500_000,
            num_words: 1,
        }
    }
}

/// Automation trigger settings
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct KeeperConfig {
    pub enabled: bool,
    pub poll_interval_ms: u64,
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 1_000,
        }
    }
}

/// Logging and notification settings
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MonitoringConfig {
    pub log_level: LogLevel,
    /// Capacity of the notification broadcast channel
    pub event_buffer_capacity: usize,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`
    pub fn as_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            event_buffer_capacity: 1024,
        }
    }
}

impl RaffleConfig {
    /// Fast rounds for local runs and demos
    pub fn development() -> Self {
        Self {
            raffle: RaffleSettings {
                entry_fee: 1,
                interval_secs: 2,
            },
            keeper: KeeperConfig {
                enabled: true,
                poll_interval_ms: 200,
            },
            monitoring: MonitoringConfig {
                log_level: LogLevel::Debug,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Conservative settings for long-running deployments
    pub fn production() -> Self {
        Self {
            raffle: RaffleSettings {
                interval_secs: 3_600,
                ..Default::default()
            },
            keeper: KeeperConfig {
                enabled: true,
                poll_interval_ms: 10_000,
            },
            ..Default::default()
        }
    }

    /// Validate configuration for logical consistency
    pub fn validate(&self) -> RaffleResult<()> {
        if self.raffle.entry_fee == 0 {
            return Err(invalid("raffle.entry_fee", "0", "Entry fee must be > 0"));
        }

        if self.raffle.interval_secs == 0 {
            return Err(invalid("raffle.interval_secs", "0", "Interval must be > 0"));
        }

        if self.oracle.key_hash.is_empty() {
            return Err(ConfigurationError::MissingRequired("oracle.key_hash".to_string()).into());
        }

        match hex::decode(self.oracle.key_hash.trim_start_matches("0x")) {
            Ok(bytes) if bytes.len() == 32 => {}
            _ => {
                return Err(invalid(
                    "oracle.key_hash",
                    &self.oracle.key_hash,
                    "Key hash must be 32 hex-encoded bytes",
                ))
            }
        }

        if self.oracle.num_words == 0 {
            return Err(invalid("oracle.num_words", "0", "At least one random word is required"));
        }

        if self.oracle.request_confirmations == 0 || self.oracle.request_confirmations > 200 {
            return Err(invalid(
                "oracle.request_confirmations",
                &self.oracle.request_confirmations.to_string(),
                "Confirmations must be between 1 and 200",
            ));
        }

        if self.oracle.callback_gas_limit == 0 {
            return Err(invalid("oracle.callback_gas_limit", "0", "Gas limit must be > 0"));
        }

        if self.keeper.enabled && self.keeper.poll_interval_ms < 10 {
            return Err(invalid(
                "keeper.poll_interval_ms",
                &self.keeper.poll_interval_ms.to_string(),
                "Poll interval must be at least 10ms",
            ));
        }

        if self.monitoring.event_buffer_capacity == 0 {
            return Err(invalid(
                "monitoring.event_buffer_capacity",
                "0",
                "Event buffer capacity must be > 0",
            ));
        }

        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.raffle.interval_secs)
    }

    pub fn keeper_poll_interval(&self) -> Duration {
        Duration::from_millis(self.keeper.poll_interval_ms)
    }
}

fn invalid(field: &str, value: &str, reason: &str) -> crate::errors::RaffleError {
    ConfigurationError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
    .into()
}

/// Configuration loader with environment variable support
#[derive(Default)]
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables
    pub fn load(&self) -> RaffleResult<RaffleConfig> {
        let mut config = match self.config_path {
            Some(ref path) => self.load_from_file(path)?,
            None => RaffleConfig::default(),
        };

        self.apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(config)
    }

    fn load_from_file(&self, path: &str) -> RaffleResult<RaffleConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path, e)))?;

        Ok(toml::from_str(&content)?)
    }

    fn apply_env_overrides(&self, config: &mut RaffleConfig) -> RaffleResult<()> {
        if let Some(fee) = env_override("RAFFLE_ENTRY_FEE")? {
            config.raffle.entry_fee = fee;
        }
        if let Some(interval) = env_override("RAFFLE_INTERVAL_SECS")? {
            config.raffle.interval_secs = interval;
        }
        if let Some(subscription_id) = env_override("RAFFLE_SUBSCRIPTION_ID")? {
            config.oracle.subscription_id = subscription_id;
        }
        if let Some(poll) = env_override("RAFFLE_KEEPER_POLL_MS")? {
            config.keeper.poll_interval_ms = poll;
        }
        if let Some(level) = env_override("RAFFLE_LOG_LEVEL")? {
            config.monitoring.log_level = level;
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, config: &RaffleConfig, path: &str) -> RaffleResult<()> {
        let toml_string = toml::to_string_pretty(config)?;

        std::fs::write(path, toml_string)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to write to {}: {}", path, e)).into())
    }
}

fn env_override<T: FromStr>(name: &str) -> RaffleResult<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| invalid(name, &raw, "Could not parse environment override")),
        Err(_) => Ok(None),
    }
}

/// Builder pattern for creating configurations
pub struct ConfigBuilder {
    config: RaffleConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: RaffleConfig::default(),
        }
    }

    pub fn entry_fee(mut self, entry_fee: Amount) -> Self {
        self.config.raffle.entry_fee = entry_fee;
        self
    }

    pub fn interval_secs(mut self, interval_secs: u64) -> Self {
        self.config.raffle.interval_secs = interval_secs;
        self
    }

    pub fn build(self) -> RaffleConfig {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate a sample configuration file
pub fn generate_sample_config(path: &str) -> RaffleResult<()> {
    ConfigLoader::new().save(&RaffleConfig::default(), path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config_is_valid() {
        assert!(RaffleConfig::default().validate().is_ok());
        assert!(RaffleConfig::development().validate().is_ok());
        assert!(RaffleConfig::production().validate().is_ok());
    }

    #[test]
    fn test_zero_fee_and_interval_rejected() {
        let mut config = RaffleConfig::default();
        config.raffle.entry_fee = 0;
        assert!(config.validate().is_err());

        let mut config = RaffleConfig::default();
        config.raffle.interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_key_hash_rejected() {
        let mut config = RaffleConfig::default();
        config.oracle.key_hash = "abcd".to_string();
        assert!(config.validate().is_err());

        config.oracle.key_hash = format!("0x{}", OracleConfig::default().key_hash);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new().entry_fee(5).interval_secs(10).build();

        assert_eq!(config.raffle.entry_fee, 5);
        assert_eq!(config.interval(), Duration::from_secs(10));
        assert_eq!(config.oracle, OracleConfig::default());
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!("DEBUG".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert!("loud".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::Warn.as_directive(), "warn");
    }

    #[test]
    fn test_save_and_load_config() -> RaffleResult<()> {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap();

        let original = RaffleConfig::development();
        ConfigLoader::new().save(&original, path)?;

        let loaded = ConfigLoader::new().with_path(path).load()?;
        assert_eq!(loaded.raffle, original.raffle);
        assert_eq!(loaded.oracle, original.oracle);

        Ok(())
    }

    #[test]
    fn test_load_rejects_malformed_file() {
        let temp_file = NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), "raffle = 3").unwrap();

        let result = ConfigLoader::new().with_path(temp_file.path()).load();
        assert!(result.is_err());
    }
}
