use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::input::target::GamepadModel;

/// Represents all possible errors loading a [RelayConfig]
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Could not read: {0}")]
    IoError(#[from] io::Error),
    #[error("Unable to deserialize: {0}")]
    DeserializeError(#[from] serde_yaml::Error),
}

/// Configuration for one emulated controller, loaded from YAML. The
/// MAC address and both SPI flash banks are hex strings; the flash
/// banks come from a dump of a real controller and carry its factory
/// calibration.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "snake_case")]
pub struct RelayConfig {
    pub model: GamepadModel,
    pub mac_addr: String,
    pub spi_rom_6000: String,
    pub spi_rom_8000: String,
    /// Path of the hidg device file the gadget exposes. Defaults to
    /// /dev/hidg0.
    pub device_path: Option<String>,
    /// Mount point of configfs. Defaults to /sys/kernel/config.
    pub configs_home: Option<String>,
    /// Name of the UDC to bind. Defaults to the first one available.
    pub udc: Option<String>,
}

impl RelayConfig {
    /// Load a [RelayConfig] from the given YAML string
    pub fn from_yaml(content: String) -> Result<RelayConfig, LoadError> {
        let config: RelayConfig = serde_yaml::from_str(content.as_str())?;
        Ok(config)
    }

    /// Load a [RelayConfig] from the given YAML file
    pub fn from_yaml_file(path: String) -> Result<RelayConfig, LoadError> {
        let file = std::fs::File::open(path)?;
        let config: RelayConfig = serde_yaml::from_reader(file)?;
        Ok(config)
    }
}

#[cfg(test)]
pub mod config_test;
