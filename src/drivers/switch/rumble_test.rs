use std::error::Error;

use crate::drivers::switch::rumble::{decode_rumble, hf_amplitude, lf_amplitude, RumbleError};

#[tokio::test]
async fn test_amplitude_table_endpoints() -> Result<(), Box<dyn Error>> {
    assert_eq!(hf_amplitude(0x00), Some(0));
    assert_eq!(hf_amplitude(0x02), Some(10));
    assert_eq!(hf_amplitude(0xc8), Some(1000));
    // Odd keys and anything past the table are unknown
    assert_eq!(hf_amplitude(0x01), None);
    assert_eq!(hf_amplitude(0xca), None);

    assert_eq!(lf_amplitude(0x0040), Some(0));
    assert_eq!(lf_amplitude(0x8040), Some(10));
    assert_eq!(lf_amplitude(0x0072), Some(1000));
    assert_eq!(lf_amplitude(0x8072), None);
    assert_eq!(lf_amplitude(0x003f), None);
    Ok(())
}

#[tokio::test]
async fn test_decode_all_zero_is_no_change() -> Result<(), Box<dyn Error>> {
    assert_eq!(decode_rumble(&[0u8; 8]), Ok(None));
    Ok(())
}

#[tokio::test]
async fn test_decode_left_motor_only() -> Result<(), Box<dyn Error>> {
    // Left: HF 0x08 -> 17, LF 0x0040 -> 0. Right side untouched.
    let block = [0x00, 0x08, 0x00, 0x40, 0x00, 0x00, 0x00, 0x00];
    let sample = decode_rumble(&block)?.ok_or("expected a sample")?;
    assert_eq!(sample.strong_magnitude, 17.0 / 2.0 / 1000.0);
    assert_eq!(sample.weak_magnitude, 0.0);
    Ok(())
}

#[tokio::test]
async fn test_decode_both_motors_average() -> Result<(), Box<dyn Error>> {
    // Both sides at full scale clamp to 1.0 on both magnitudes.
    let block = [0x00, 0xc8, 0x00, 0x72, 0x00, 0xc8, 0x00, 0x72];
    let sample = decode_rumble(&block)?.ok_or("expected a sample")?;
    assert_eq!(sample.strong_magnitude, 1.0);
    assert_eq!(sample.weak_magnitude, 1.0);
    Ok(())
}

#[tokio::test]
async fn test_decode_zero_amplitudes_is_silent() -> Result<(), Box<dyn Error>> {
    // Non-zero bytes that decode to amplitude 0 on both channels.
    let block = [0x00, 0x00, 0x00, 0x40, 0x00, 0x00, 0x00, 0x40];
    assert_eq!(decode_rumble(&block), Ok(None));
    Ok(())
}

#[tokio::test]
async fn test_decode_unknown_amplitudes() -> Result<(), Box<dyn Error>> {
    let block = [0x00, 0xfe, 0x00, 0x40, 0x00, 0x00, 0x00, 0x00];
    assert_eq!(
        decode_rumble(&block),
        Err(RumbleError::UnknownHighAmplitude(0xfe))
    );
    let block = [0x00, 0x08, 0x00, 0x3f, 0x00, 0x00, 0x00, 0x00];
    assert_eq!(
        decode_rumble(&block),
        Err(RumbleError::UnknownLowAmplitude(0x003f))
    );
    Ok(())
}

#[tokio::test]
async fn test_decode_truncated_block() -> Result<(), Box<dyn Error>> {
    assert_eq!(
        decode_rumble(&[0x00, 0x08]),
        Err(RumbleError::TruncatedBlock(2))
    );
    Ok(())
}
