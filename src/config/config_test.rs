use std::error::Error;

use crate::config::RelayConfig;
use crate::input::target::GamepadModel;

#[tokio::test]
async fn test_load_minimal_config() -> Result<(), Box<dyn Error>> {
    let yaml = r"
model: switch_pro
mac_addr: 7c10c64e8a68
spi_rom_6000: ffffffff
spi_rom_8000: ffffffff
";
    let config = RelayConfig::from_yaml(yaml.to_string())?;
    assert_eq!(config.model, GamepadModel::SwitchPro);
    assert_eq!(config.mac_addr, "7c10c64e8a68");
    assert!(config.device_path.is_none());
    assert!(config.udc.is_none());
    Ok(())
}

#[tokio::test]
async fn test_load_full_config() -> Result<(), Box<dyn Error>> {
    let yaml = r"
model: switch_pro
mac_addr: 7c10c64e8a68
spi_rom_6000: ffffffff
spi_rom_8000: ffffffff
device_path: /dev/hidg1
configs_home: /tmp/configfs
udc: fe980000.usb
";
    let config = RelayConfig::from_yaml(yaml.to_string())?;
    assert_eq!(config.device_path.as_deref(), Some("/dev/hidg1"));
    assert_eq!(config.configs_home.as_deref(), Some("/tmp/configfs"));
    assert_eq!(config.udc.as_deref(), Some("fe980000.usb"));
    Ok(())
}

#[tokio::test]
async fn test_missing_field_is_an_error() -> Result<(), Box<dyn Error>> {
    let yaml = r"
model: switch_pro
mac_addr: 7c10c64e8a68
";
    assert!(RelayConfig::from_yaml(yaml.to_string()).is_err());
    Ok(())
}
