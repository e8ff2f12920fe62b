use clap::ArgMatches;
use log::{debug, info};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::utils::error::ConfigError;

/// On-disk / command-line settings for the PLC link.
///
/// Loaded once at start-up and never written back.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub serial_port: String,
    pub baud_rate: u32,
    pub slave_address: u8,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
}

/// Serial identity and timing of one controller. Fixed for the controller's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub port_name: String,
    pub baud_rate: u32,
    pub slave_address: u8,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        let serial_port = if cfg!(target_os = "windows") {
            "COM1"
        } else {
            "/dev/ttyUSB0"
        };

        Self {
            serial_port: serial_port.to_string(),
            baud_rate: 115_200,
            slave_address: 0x02,
            read_timeout_ms: 500,
            write_timeout_ms: 500,
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;

        info!("📄 Loaded configuration from {}", path.as_ref().display());
        Ok(config)
    }

    /// Starts from the file named by `--config` (or defaults) and applies the
    /// remaining command-line overrides on top.
    pub fn from_matches(matches: &ArgMatches) -> Result<Self, ConfigError> {
        let mut config = match matches.get_one::<String>("config") {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Some(port) = matches.get_one::<String>("port") {
            config.serial_port = port.clone();
        }
        if let Some(baud) = matches.get_one::<String>("baud") {
            config.baud_rate = parse_number(baud, "baud")?;
        }
        if let Some(slave) = matches.get_one::<String>("slave") {
            config.slave_address = parse_number(slave, "slave")?;
        }
        if let Some(timeout) = matches.get_one::<String>("timeout") {
            let timeout = parse_number(timeout, "timeout")?;
            config.read_timeout_ms = timeout;
            config.write_timeout_ms = timeout;
        }

        config.validate()?;
        debug!("Effective configuration: {:?}", config);
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.baud_rate == 0 {
            return Err(ConfigError::Invalid("baud_rate must be positive".to_string()));
        }
        if self.slave_address == 0 || self.slave_address > 247 {
            return Err(ConfigError::Invalid(format!(
                "slave_address {} out of range 1-247",
                self.slave_address
            )));
        }
        if self.read_timeout_ms == 0 || self.write_timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeouts must be positive".to_string()));
        }
        Ok(())
    }

    pub fn device_config(&self) -> DeviceConfig {
        DeviceConfig {
            port_name: self.serial_port.clone(),
            baud_rate: self.baud_rate,
            slave_address: self.slave_address,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            write_timeout: Duration::from_millis(self.write_timeout_ms),
        }
    }
}

pub fn parse_number<T: TryFrom<u64>>(value: &str, name: &str) -> Result<T, ConfigError> {
    let trimmed = value.trim();
    let wide = match trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => trimmed.parse::<u64>().ok(),
    };
    wide.and_then(|n| T::try_from(n).ok())
        .ok_or_else(|| ConfigError::Invalid(format!("{} expects a number, got '{}'", name, value)))
}
