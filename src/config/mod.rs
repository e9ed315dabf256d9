//! # Configuration Management Module
//!
//! Settings for the dongle link and logging, stored as TOML.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pvdongle::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Write a starter file, then load it back
//!     Config::create_default("pvdongle.toml").await?;
//!     let config = Config::load("pvdongle.toml").await?;
//!     println!("Serial Port: {}", config.dongle.port);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [dongle]
//! port = "/dev/ttyACM0"
//! baud_rate = 38400
//! network_id = 17520
//!
//! [logging]
//! level = "info"
//! file = "pvdongle.log"
//! ```
//!
//! Protocol timing (poll budget, settle delays, supervisor period) is a
//! property of the dongle firmware and deliberately not configurable here.
//!
//! Precedence: CLI args > Config file > Defaults

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::dongle::codec::DEFAULT_NETWORK_ID;
use crate::dongle::transport::DEFAULT_BAUD_RATE;
use crate::dongle::LinkOptions;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub dongle: DongleConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DongleConfig {
    /// Serial device path, e.g. `/dev/ttyACM0` or `COM3`.
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Network id presented during the identity handshake.
    #[serde(default = "default_network_id")]
    pub network_id: u16,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_network_id() -> u16 {
    DEFAULT_NETWORK_ID
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Parsed level; unknown strings fall back to `info`.
    pub fn level_filter(&self) -> log::LevelFilter {
        self.level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

impl DongleConfig {
    pub fn link_options(&self) -> LinkOptions {
        LinkOptions {
            network_id: self.network_id,
            ..LinkOptions::default()
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Defaults with file logging switched off, for runs without a config file.
    pub fn console_only() -> Self {
        let mut config = Config::default();
        config.logging.file = None;
        config
    }

    pub fn validate(&self) -> Result<()> {
        if self.dongle.port.trim().is_empty() {
            bail!("dongle.port must not be empty");
        }
        if self.dongle.baud_rate == 0 {
            bail!("dongle.baud_rate must be greater than zero");
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            dongle: DongleConfig {
                #[cfg(windows)]
                port: "COM3".to_string(),
                #[cfg(not(windows))]
                port: "/dev/ttyACM0".to_string(),
                baud_rate: DEFAULT_BAUD_RATE,
                network_id: DEFAULT_NETWORK_ID,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file: Some("pvdongle.log".to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_dongle_firmware() {
        let config = Config::default();
        assert_eq!(config.dongle.baud_rate, 38400);
        assert_eq!(config.dongle.network_id, 17520);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_minimal_file_fills_defaults() {
        let config: Config = toml::from_str("[dongle]\nport = \"/dev/ttyUSB1\"\n").unwrap();
        assert_eq!(config.dongle.port, "/dev/ttyUSB1");
        assert_eq!(config.dongle.baud_rate, 38400);
        assert_eq!(config.dongle.network_id, 17520);
        assert_eq!(config.logging, LoggingConfig::default());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.dongle.port = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.dongle.baud_rate = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_level_filter_fallback() {
        let logging = LoggingConfig {
            level: "debug".into(),
            file: None,
        };
        assert_eq!(logging.level_filter(), log::LevelFilter::Debug);
        let logging = LoggingConfig {
            level: "chatty".into(),
            file: None,
        };
        assert_eq!(logging.level_filter(), log::LevelFilter::Info);
    }

    #[test]
    fn test_console_only_skips_log_file() {
        let config = Config::console_only();
        assert!(config.logging.file.is_none());
        assert_eq!(config.dongle, Config::default().dongle);
    }

    #[tokio::test]
    async fn test_create_default_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pvdongle.toml");
        let path = path.to_str().unwrap();
        Config::create_default(path).await.unwrap();
        let loaded = Config::load(path).await.unwrap();
        assert_eq!(loaded, Config::default());
    }

    #[tokio::test]
    async fn test_load_reports_missing_file() {
        let err = Config::load("/nonexistent/pvdongle.toml").await.unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_link_options_carry_network_id() {
        let mut config = Config::default();
        config.dongle.network_id = 0x1234;
        let options = config.dongle.link_options();
        assert_eq!(options.network_id, 0x1234);
        assert_eq!(options.timing.poll_count, 10);
    }
}
