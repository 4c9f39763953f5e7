//! Decoder for the compressed dual-motor rumble encoding carried in
//! every 0x01/0x10 output report.
//!
//! Amplitudes are not linear on the wire. Each high-frequency amplitude
//! byte and low-frequency amplitude word indexes a fixed curve of
//! intensities scaled by 1000, reverse-engineered from captures of the
//! real controller.
use thiserror::Error;

/// Nominal event duration in milliseconds. The wire protocol does not
/// convey a duration, so a constant is substituted.
pub const RUMBLE_DURATION_MS: u32 = 1000;

/// Nominal start delay in milliseconds.
pub const RUMBLE_START_DELAY_MS: u32 = 0;

/// Size of the rumble block inside an output report.
pub const RUMBLE_BLOCK_LEN: usize = 8;

/// The shared amplitude curve, scaled by 1000. The high-frequency table
/// walks this curve with byte keys 0x00, 0x02, .. 0xc8 and the
/// low-frequency table with word keys 0x0040, 0x8040, 0x0041, .. 0x0072.
const AMPLITUDE_STEPS: [u16; 101] = [
    0, 10, 12, 14, 17, 20, 24, 28, 33, 40,
    47, 56, 67, 80, 95, 112, 117, 123, 128, 134,
    140, 146, 152, 159, 166, 173, 181, 189, 198, 206,
    215, 225, 230, 235, 240, 245, 251, 256, 262, 268,
    273, 279, 286, 292, 298, 305, 311, 318, 325, 332,
    340, 347, 355, 362, 370, 378, 387, 395, 404, 413,
    422, 431, 440, 450, 460, 470, 480, 491, 501, 512,
    524, 535, 547, 559, 571, 584, 596, 609, 623, 636,
    650, 665, 679, 694, 709, 725, 741, 757, 773, 790,
    808, 825, 843, 862, 881, 900, 920, 940, 960, 981,
    1000,
];

/// Look up a high-frequency amplitude byte. Valid keys are the even
/// bytes 0x00..=0xc8.
pub fn hf_amplitude(value: u8) -> Option<u16> {
    if value % 2 != 0 {
        return None;
    }
    AMPLITUDE_STEPS.get(value as usize / 2).copied()
}

/// Look up a low-frequency amplitude word. Valid keys interleave
/// 0x00nn/0x80nn pairs for nn in 0x40..=0x72 (0x8072 excluded).
pub fn lf_amplitude(value: u16) -> Option<u16> {
    let low = (value & 0x00ff) as usize;
    let high = value & 0xff00;
    if !(0x40..=0x72).contains(&low) {
        return None;
    }
    let index = match high {
        0x0000 => (low - 0x40) * 2,
        0x8000 => (low - 0x40) * 2 + 1,
        _ => return None,
    };
    AMPLITUDE_STEPS.get(index).copied()
}

#[derive(Debug, Error, PartialEq)]
pub enum RumbleError {
    #[error("rumble block is {0} bytes, expected {RUMBLE_BLOCK_LEN}")]
    TruncatedBlock(usize),
    #[error("no high-frequency amplitude entry for 0x{0:02x}")]
    UnknownHighAmplitude(u8),
    #[error("no low-frequency amplitude entry for 0x{0:04x}")]
    UnknownLowAmplitude(u16),
}

/// A decoded rumble event with both magnitudes normalized to [0.0, 1.0].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RumbleSample {
    pub strong_magnitude: f64,
    pub weak_magnitude: f64,
}

/// Decode the 8-byte rumble block (4 left motor bytes, 4 right motor
/// bytes). An all-zero side means "no change" for that motor pair and
/// contributes nothing. Returns `Ok(None)` when there is nothing to
/// report: both sides unchanged, or every amplitude resolves to zero.
pub fn decode_rumble(bytes: &[u8]) -> Result<Option<RumbleSample>, RumbleError> {
    if bytes.len() < RUMBLE_BLOCK_LEN {
        return Err(RumbleError::TruncatedBlock(bytes.len()));
    }
    let (left, right) = (&bytes[0..4], &bytes[4..8]);

    let (mut left_high, mut left_low) = (0u16, 0u16);
    let (mut right_high, mut right_low) = (0u16, 0u16);

    if left.iter().any(|b| *b != 0) {
        let hf = left[1] & 0xfe;
        let lf = ((left[2] as u16 & 0x80) << 8) | left[3] as u16;
        left_high = hf_amplitude(hf).ok_or(RumbleError::UnknownHighAmplitude(hf))?;
        left_low = lf_amplitude(lf).ok_or(RumbleError::UnknownLowAmplitude(lf))?;
    }
    if right.iter().any(|b| *b != 0) {
        let hf = right[1] & 0xfe;
        let lf = ((right[2] as u16 & 0x80) << 8) | right[3] as u16;
        right_high = hf_amplitude(hf).ok_or(RumbleError::UnknownHighAmplitude(hf))?;
        right_low = lf_amplitude(lf).ok_or(RumbleError::UnknownLowAmplitude(lf))?;
    }

    if left_high == 0 && left_low == 0 && right_high == 0 && right_low == 0 {
        return Ok(None);
    }

    // Averaged over the two motors; a "no change" side contributes zero
    // to the sum but the divisor stays fixed.
    let strong = f64::from(left_high + right_high) / 2.0 / 1000.0;
    let weak = f64::from(left_low + right_low) / 2.0 / 1000.0;

    Ok(Some(RumbleSample {
        strong_magnitude: strong.min(1.0),
        weak_magnitude: weak.min(1.0),
    }))
}
