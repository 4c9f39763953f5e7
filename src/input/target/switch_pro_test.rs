use std::error::Error;
use std::sync::{Arc, Mutex};

use tokio::io::AsyncReadExt;
use tokio::sync::watch;

use crate::config::RelayConfig;
use crate::drivers::switch::hid_report::{ReportType, REPORT_LEN};
use crate::drivers::switch::spi_flash::SpiFlash;
use crate::input::capability::Button;
use crate::input::event::GamepadStateEvent;
use crate::input::target::switch_pro::{
    read_report_loop, DeviceIdentity, HandshakeState, ProtocolEngine,
};
use crate::input::target::{GamepadError, GamepadModel, TargetGamepad};

const MAC: [u8; 6] = [0x7c, 0x10, 0xc6, 0x4e, 0x8a, 0x68];

fn engine() -> ProtocolEngine {
    let identity = DeviceIdentity::from_hex("7c10c64e8a68").unwrap();
    let flash = SpiFlash::new((0..=255).collect(), vec![0xff; 256]);
    ProtocolEngine::new(identity, flash)
}

/// A 64-byte USB init request.
fn init_request(subtype: u8) -> [u8; REPORT_LEN] {
    let mut buf = [0u8; REPORT_LEN];
    buf[0] = 0x80;
    buf[1] = subtype;
    buf
}

/// A 64-byte 0x01 command report with a zeroed rumble block.
fn subcommand_request(subcommand: u8, args: &[u8]) -> [u8; REPORT_LEN] {
    let mut buf = [0u8; REPORT_LEN];
    buf[0] = 0x01;
    buf[10] = subcommand;
    buf[11..11 + args.len()].copy_from_slice(args);
    buf
}

#[tokio::test]
async fn test_identity_orderings() -> Result<(), Box<dyn Error>> {
    let identity = DeviceIdentity::from_hex("7c10c64e8a68")?;
    assert_eq!(identity.mac, MAC);
    assert_eq!(
        identity.mac_reversed,
        [0x68, 0x8a, 0x4e, 0xc6, 0x10, 0x7c]
    );
    assert!(DeviceIdentity::from_hex("7c10c64e8a").is_err());
    assert!(DeviceIdentity::from_hex("not hex at all").is_err());
    Ok(())
}

#[tokio::test]
async fn test_full_init_sequence_unlocks_reporting() -> Result<(), Box<dyn Error>> {
    let engine = engine();
    assert_eq!(engine.handshake(), HandshakeState::Init);
    assert!(!engine.reporting_enabled());

    engine.handle_report(&init_request(0x01));
    assert_eq!(engine.handshake(), HandshakeState::Mac);

    engine.handle_report(&init_request(0x02));
    assert_eq!(engine.handshake(), HandshakeState::Handshake);

    engine.handle_report(&init_request(0x03));
    assert_eq!(engine.handshake(), HandshakeState::BaudRate);

    // The handshake after the baud rate switch is the terminal one
    engine.handle_report(&init_request(0x02));
    assert_eq!(engine.handshake(), HandshakeState::Handshake2);
    assert!(!engine.reporting_enabled());

    engine.handle_report(&init_request(0x04));
    assert_eq!(engine.handshake(), HandshakeState::DisableUsbTimeout);
    assert!(engine.reporting_enabled());

    engine.handle_report(&init_request(0x05));
    assert!(!engine.reporting_enabled());
    Ok(())
}

#[tokio::test]
async fn test_mac_request_reply() -> Result<(), Box<dyn Error>> {
    let engine = engine();
    let dispatch = engine.handle_report(&init_request(0x01));
    assert_eq!(dispatch.replies.len(), 1);
    let (report_type, payload) = &dispatch.replies[0];
    assert_eq!(*report_type, ReportType::UsbInputReport);
    assert_eq!(payload[..3], [0x01, 0x00, 0x03]);
    assert_eq!(payload[3..], MAC);
    Ok(())
}

#[tokio::test]
async fn test_handshake_and_baud_rate_echo() -> Result<(), Box<dyn Error>> {
    let engine = engine();
    for subtype in [0x02u8, 0x03] {
        let dispatch = engine.handle_report(&init_request(subtype));
        assert_eq!(dispatch.replies.len(), 1);
        let (report_type, payload) = &dispatch.replies[0];
        assert_eq!(*report_type, ReportType::UsbInputReport);
        assert_eq!(payload.as_slice(), &[subtype]);
    }
    Ok(())
}

#[tokio::test]
async fn test_device_info_reply() -> Result<(), Box<dyn Error>> {
    let engine = engine();
    let dispatch = engine.handle_report(&subcommand_request(0x02, &[]));
    assert_eq!(dispatch.replies.len(), 1);
    let (report_type, payload) = &dispatch.replies[0];
    assert_eq!(*report_type, ReportType::CommandInputReport);
    // 12-byte controller report prefix, then ack, subcommand, data
    assert_eq!(payload[12], 0x82);
    assert_eq!(payload[13], 0x02);
    assert_eq!(payload[14..18], [0x03, 0x48, 0x03, 0x02]);
    assert_eq!(payload[18..24], [0x68, 0x8a, 0x4e, 0xc6, 0x10, 0x7c]);
    assert_eq!(payload[24..26], [0x03, 0x02]);
    Ok(())
}

#[tokio::test]
async fn test_spi_read_success() -> Result<(), Box<dyn Error>> {
    let engine = engine();
    // 4 bytes at 0x6010
    let dispatch = engine.handle_report(&subcommand_request(0x10, &[0x10, 0x60, 0x00, 0x00, 0x04]));
    let (_, payload) = &dispatch.replies[0];
    assert_eq!(payload[12], 0x90);
    assert_eq!(payload[13], 0x10);
    // Request echo, then the flash contents
    assert_eq!(payload[14..19], [0x10, 0x60, 0x00, 0x00, 0x04]);
    assert_eq!(payload[19..23], [0x10, 0x11, 0x12, 0x13]);
    Ok(())
}

#[tokio::test]
async fn test_spi_read_unknown_bank_is_nacked() -> Result<(), Box<dyn Error>> {
    let engine = engine();
    let dispatch = engine.handle_report(&subcommand_request(0x10, &[0x00, 0x70, 0x00, 0x00, 0x04]));
    assert_eq!(dispatch.replies.len(), 1);
    let (_, payload) = &dispatch.replies[0];
    assert_eq!(payload[12], 0x00);
    assert_eq!(payload[13], 0x10);
    assert_eq!(payload.len(), 14);
    Ok(())
}

#[tokio::test]
async fn test_spi_read_out_of_range_is_nacked() -> Result<(), Box<dyn Error>> {
    let engine = engine();
    let dispatch = engine.handle_report(&subcommand_request(0x10, &[0xf0, 0x60, 0x00, 0x00, 0x20]));
    let (_, payload) = &dispatch.replies[0];
    assert_eq!(payload[12], 0x00);
    Ok(())
}

#[tokio::test]
async fn test_unknown_subcommand_gets_no_reply() -> Result<(), Box<dyn Error>> {
    let engine = engine();
    let dispatch = engine.handle_report(&subcommand_request(0x47, &[]));
    assert!(dispatch.replies.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_imu_and_vibration_subcommands_update_state() -> Result<(), Box<dyn Error>> {
    let engine = engine();
    let dispatch = engine.handle_report(&subcommand_request(0x40, &[0x01]));
    assert_eq!(dispatch.replies[0].1[12], 0x80);
    assert_eq!(engine.with_controller(|c| c.imu_enable), 0x01);

    engine.handle_report(&subcommand_request(0x41, &[0x03, 0x00, 0x01, 0x01]));
    let sensitivity = engine.with_controller(|c| c.imu_sensitivity);
    assert_eq!(sensitivity.gyro_sensitivity, 0x03);
    assert_eq!(sensitivity.accelerometer_filter_bandwidth, 0x01);

    engine.handle_report(&subcommand_request(0x48, &[0x01]));
    assert_eq!(engine.with_controller(|c| c.vibration_enable), 0x01);
    Ok(())
}

#[tokio::test]
async fn test_rumble_block_produces_vibration_event() -> Result<(), Box<dyn Error>> {
    let engine = engine();
    let mut buf = [0u8; REPORT_LEN];
    buf[0] = 0x10;
    // Left motor: HF 0x08 -> 17, LF 0x0040 -> 0
    buf[2..6].copy_from_slice(&[0x00, 0x08, 0x00, 0x40]);
    let dispatch = engine.handle_report(&buf);
    assert!(dispatch.replies.is_empty());
    let event = dispatch.vibration.ok_or("expected a vibration event")?;
    assert_eq!(event.strong_magnitude, 17.0 / 2.0 / 1000.0);
    assert_eq!(event.weak_magnitude, 0.0);
    Ok(())
}

#[tokio::test]
async fn test_truncated_reports_are_dropped() -> Result<(), Box<dyn Error>> {
    let engine = engine();
    assert!(engine.handle_report(&[]).replies.is_empty());
    assert!(engine.handle_report(&[0x80]).replies.is_empty());
    // Subcommand report cut short of the subcommand byte
    assert!(engine.handle_report(&[0x01; 12]).replies.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_reporter_gated_on_handshake() -> Result<(), Box<dyn Error>> {
    use std::time::Duration;

    use crate::input::target::switch_pro::write_report_loop;

    let engine = engine();
    let (client, server) = tokio::io::duplex(REPORT_LEN * 8);
    let (mut client_read, _client_write) = tokio::io::split(client);
    let (_server_read, server_write) = tokio::io::split(server);
    let (stop_tx, stop_rx) = watch::channel(false);

    let reporter = tokio::spawn(write_report_loop(
        engine.clone(),
        Arc::new(tokio::sync::Mutex::new(server_write)),
        stop_rx,
    ));

    // Nothing may be pushed before the usb timeout is disabled
    let mut record = [0u8; REPORT_LEN];
    let early = tokio::time::timeout(
        Duration::from_millis(60),
        client_read.read_exact(&mut record),
    )
    .await;
    assert!(early.is_err());

    engine.handle_report(&init_request(0x04));
    tokio::time::timeout(
        Duration::from_millis(500),
        client_read.read_exact(&mut record),
    )
    .await??;
    assert_eq!(record[0], 0x30);
    // Battery/connection byte of the embedded controller report
    assert_eq!(record[2], 0x81);

    stop_tx.send(true)?;
    reporter.await?;
    Ok(())
}

fn test_config(model: GamepadModel) -> RelayConfig {
    RelayConfig {
        model,
        mac_addr: "7c10c64e8a68".to_string(),
        spi_rom_6000: "ff".repeat(256),
        spi_rom_8000: "ff".repeat(256),
        device_path: None,
        configs_home: None,
        udc: None,
    }
}

#[tokio::test]
async fn test_target_gamepad_construction() -> Result<(), Box<dyn Error>> {
    let gamepad = TargetGamepad::new(&test_config(GamepadModel::SwitchPro))?;
    // Mutators are valid before the session loops run
    gamepad.press(&[Button::A, Button::Home]);
    gamepad.release(&[Button::A]);
    gamepad.stick_l(0.5, -0.5);
    gamepad.stick_r(-1.0, 1.0);
    gamepad.update_state(&GamepadStateEvent {
        buttons: vec![true; 4],
        axes: vec![0.0; 4],
    });
    gamepad.stop_vibration_listener();
    Ok(())
}

#[tokio::test]
async fn test_unsupported_model_fails_at_construction() -> Result<(), Box<dyn Error>> {
    let result = TargetGamepad::new(&test_config(GamepadModel::Ds4));
    assert!(matches!(result, Err(GamepadError::UnsupportedModel(_))));
    Ok(())
}

#[tokio::test]
async fn test_bad_rom_hex_fails_at_construction() -> Result<(), Box<dyn Error>> {
    let mut config = test_config(GamepadModel::SwitchPro);
    config.spi_rom_6000 = "zz".to_string();
    assert!(matches!(
        TargetGamepad::new(&config),
        Err(GamepadError::InvalidSpiRom { bank: 0x60, .. })
    ));
    Ok(())
}

#[tokio::test]
async fn test_session_round_trip_over_duplex() -> Result<(), Box<dyn Error>> {
    let engine = engine();
    let (client, server) = tokio::io::duplex(REPORT_LEN * 8);
    let (server_read, server_write) = tokio::io::split(server);
    let (mut client_read, mut client_write) = tokio::io::split(client);
    let (stop_tx, stop_rx) = watch::channel(false);

    let session = tokio::spawn(read_report_loop(
        engine.clone(),
        server_read,
        Arc::new(tokio::sync::Mutex::new(server_write)),
        Arc::new(Mutex::new(None)),
        stop_rx,
    ));

    // The session opens with the usb reset record
    let mut record = [0u8; REPORT_LEN];
    client_read.read_exact(&mut record).await?;
    assert_eq!(record[..4], [0x81, 0x01, 0x00, 0x03]);

    // Request the MAC and read the framed reply
    use tokio::io::AsyncWriteExt;
    client_write.write_all(&init_request(0x01)).await?;
    client_read.read_exact(&mut record).await?;
    assert_eq!(record[..4], [0x81, 0x01, 0x00, 0x03]);
    assert_eq!(record[4..10], MAC);
    assert_eq!(engine.handshake(), HandshakeState::Mac);

    stop_tx.send(true)?;
    session.await?;
    Ok(())
}
