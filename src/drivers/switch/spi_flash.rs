//! Emulation of the controller's onboard SPI flash. The host reads two
//! address spaces during pairing: factory configuration/calibration at
//! 0x60xx and user calibration at 0x80xx. Both are served verbatim from
//! buffers supplied at construction.
use thiserror::Error;

/// Bank selector byte for the 0x60xx address space.
pub const BANK_FACTORY: u8 = 0x60;
/// Bank selector byte for the 0x80xx address space.
pub const BANK_USER: u8 = 0x80;

#[derive(Debug, Error, PartialEq)]
pub enum SpiReadError {
    #[error("no emulated flash bank at 0x{0:02x}00")]
    UnknownBank(u8),
    #[error("read of {len} bytes at 0x{bank:02x}{offset:02x} exceeds the {size}-byte bank")]
    OutOfRange {
        bank: u8,
        offset: u8,
        len: u8,
        size: usize,
    },
}

/// Immutable in-memory stand-in for the controller's SPI ROM.
#[derive(Debug, Clone)]
pub struct SpiFlash {
    factory: Vec<u8>,
    user: Vec<u8>,
}

impl SpiFlash {
    pub fn new(factory: Vec<u8>, user: Vec<u8>) -> Self {
        Self { factory, user }
    }

    /// Bounds-checked read of `len` bytes at `offset` within the given
    /// bank. An unknown bank fails distinctly from an in-bank
    /// out-of-range request.
    pub fn read(&self, bank: u8, offset: u8, len: u8) -> Result<&[u8], SpiReadError> {
        let memory = match bank {
            BANK_FACTORY => &self.factory,
            BANK_USER => &self.user,
            other => return Err(SpiReadError::UnknownBank(other)),
        };
        let start = offset as usize;
        let end = start + len as usize;
        if end > memory.len() {
            return Err(SpiReadError::OutOfRange {
                bank,
                offset,
                len,
                size: memory.len(),
            });
        }
        Ok(&memory[start..end])
    }
}
