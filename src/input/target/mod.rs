pub mod switch_pro;
#[cfg(test)]
pub mod switch_pro_test;

use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::RelayConfig;
use crate::input::capability::Button;
use crate::input::event::{GamepadStateEvent, GamepadVibration};
use crate::usb::gadget::GadgetError;

use switch_pro::SwitchProDevice;

/// Controller models selectable in the config file. Only one is
/// implemented; the other is kept so configs for it fail loudly at
/// construction instead of at first use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GamepadModel {
    SwitchPro,
    Ds4,
}

#[derive(Debug, Error)]
pub enum GamepadError {
    #[error("invalid mac address: {0}")]
    InvalidMacAddress(String),
    #[error("invalid spi rom hex for bank 0x{bank:02x}00: {source}")]
    InvalidSpiRom {
        bank: u8,
        source: hex::FromHexError,
    },
    #[error(transparent)]
    Gadget(#[from] GadgetError),
    #[error("gadget device file {0} did not appear after enable")]
    MissingDeviceFile(PathBuf),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("gamepad model {0:?} is not supported")]
    UnsupportedModel(GamepadModel),
}

/// A target gamepad emulation selected at construction time.
pub enum TargetGamepad {
    SwitchPro(SwitchProDevice),
}

impl TargetGamepad {
    pub fn new(config: &RelayConfig) -> Result<Self, GamepadError> {
        match config.model {
            GamepadModel::SwitchPro => Ok(Self::SwitchPro(SwitchProDevice::new(config)?)),
            GamepadModel::Ds4 => Err(GamepadError::UnsupportedModel(config.model)),
        }
    }

    /// Configure the USB gadget and wait for the device file to appear.
    pub async fn setup(&self) -> Result<(), GamepadError> {
        match self {
            Self::SwitchPro(dev) => dev.setup().await,
        }
    }

    /// Open the gadget device stream and spawn the protocol loops.
    pub fn start(&mut self) -> Result<(), GamepadError> {
        match self {
            Self::SwitchPro(dev) => dev.start(),
        }
    }

    /// Stop the protocol loops and tear the gadget down.
    pub fn stop(&mut self) {
        match self {
            Self::SwitchPro(dev) => dev.stop(),
        }
    }

    pub fn update_state(&self, event: &GamepadStateEvent) {
        match self {
            Self::SwitchPro(dev) => dev.update_state(event),
        }
    }

    pub fn press(&self, buttons: &[Button]) {
        match self {
            Self::SwitchPro(dev) => dev.press(buttons),
        }
    }

    pub fn release(&self, buttons: &[Button]) {
        match self {
            Self::SwitchPro(dev) => dev.release(buttons),
        }
    }

    pub fn stick_l(&self, x: f64, y: f64) {
        match self {
            Self::SwitchPro(dev) => dev.stick_l(x, y),
        }
    }

    pub fn stick_r(&self, x: f64, y: f64) {
        match self {
            Self::SwitchPro(dev) => dev.stick_r(x, y),
        }
    }

    pub fn start_vibration_listener<F>(&self, handler: F)
    where
        F: Fn(GamepadVibration) + Send + 'static,
    {
        match self {
            Self::SwitchPro(dev) => dev.start_vibration_listener(handler),
        }
    }

    pub fn stop_vibration_listener(&self) {
        match self {
            Self::SwitchPro(dev) => dev.stop_vibration_listener(),
        }
    }
}
