//! Emulated Switch Pro Controller on a USB HID gadget port.
//!
//! Two loops run per session: a reader that dispatches every inbound
//! report (USB init requests, subcommands, rumble data) and a 60 Hz
//! writer that pushes the current controller state once the host has
//! finished the wired init sequence.
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use packed_struct::prelude::*;
use packed_struct::PackingError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tokio::time::interval;

use crate::config::RelayConfig;
use crate::drivers::switch::hid_report::{
    ack_byte, encode_report, ReportType, Subcommand, UsbInitSubtype,
    DEVICE_TYPE_PRO_CONTROLLER, REPORT_LEN,
};
use crate::drivers::switch::report_descriptor::{
    CONFIGURATION, CONTROLLER_DESCRIPTOR, MANUFACTURER, PID, PRODUCT, SERIAL, VID,
};
use crate::drivers::switch::rumble::{decode_rumble, RUMBLE_DURATION_MS, RUMBLE_START_DELAY_MS};
use crate::drivers::switch::spi_flash::SpiFlash;
use crate::input::capability::Button;
use crate::input::event::{GamepadStateEvent, GamepadVibration};
use crate::input::state::ControllerState;
use crate::usb::gadget::{UsbGadgetHid, UsbGadgetHidParams};

use super::GamepadError;

const DEFAULT_DEVICE_PATH: &str = "/dev/hidg0";
const DEFAULT_CONFIGS_HOME: &str = "/sys/kernel/config";

/// 60 Hz, rounded up to whole microseconds.
const REPORT_INTERVAL: Duration = Duration::from_micros(16_667);

/// Kernel-side enumeration is not instant; gadget lifecycle steps wait
/// this long before the next step touches the device.
const GADGET_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Canned reply to SetNfcIrMcuConfiguration, captured from a real
/// controller. NFC/IR itself is not emulated.
const NFC_IR_MCU_STATE: [u8; 34] = [
    0x01, 0x00, 0xff, 0x00, 0x03, 0x00, 0x05, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x5c,
];

/// Progress of the wired init sequence. Ordering matters: periodic
/// input reports are gated on reaching [HandshakeState::DisableUsbTimeout].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HandshakeState {
    Init,
    EnableUsbTimeout,
    Mac,
    Handshake,
    BaudRate,
    Handshake2,
    DisableUsbTimeout,
}

/// The controller's MAC address in both byte orders. The MAC reply and
/// the device-info reply use opposite orderings on the wire.
#[derive(Debug, Clone, Copy)]
pub struct DeviceIdentity {
    pub mac: [u8; 6],
    pub mac_reversed: [u8; 6],
}

impl DeviceIdentity {
    pub fn from_hex(mac: &str) -> Result<Self, GamepadError> {
        let decoded = hex::decode(mac)
            .map_err(|e| GamepadError::InvalidMacAddress(format!("{mac}: {e}")))?;
        let mac_bytes: [u8; 6] = decoded.as_slice().try_into().map_err(|_| {
            GamepadError::InvalidMacAddress(format!(
                "{mac}: expected 6 bytes, got {}",
                decoded.len()
            ))
        })?;
        let mut mac_reversed = mac_bytes;
        mac_reversed.reverse();
        Ok(Self {
            mac: mac_bytes,
            mac_reversed,
        })
    }
}

/// State shared between the reader loop, the reporter loop and the
/// external mutator API. One lock guards all of it; every access is a
/// short critical section with no I/O inside.
#[derive(Debug)]
struct SharedState {
    controller: ControllerState,
    handshake: HandshakeState,
    usb_timeout: bool,
}

impl Default for SharedState {
    fn default() -> Self {
        Self {
            controller: ControllerState::default(),
            handshake: HandshakeState::Init,
            usb_timeout: true,
        }
    }
}

/// Everything produced by dispatching one inbound report.
#[derive(Debug, Default)]
pub(crate) struct Dispatch {
    pub(crate) replies: Vec<(ReportType, Vec<u8>)>,
    pub(crate) vibration: Option<GamepadVibration>,
}

/// The protocol state machine, separated from the I/O loops so it can
/// be driven directly by tests.
#[derive(Clone)]
pub(crate) struct ProtocolEngine {
    shared: Arc<Mutex<SharedState>>,
    identity: DeviceIdentity,
    flash: Arc<SpiFlash>,
}

impl ProtocolEngine {
    pub(crate) fn new(identity: DeviceIdentity, flash: SpiFlash) -> Self {
        Self {
            shared: Arc::new(Mutex::new(SharedState::default())),
            identity,
            flash: Arc::new(flash),
        }
    }

    pub(crate) fn handshake(&self) -> HandshakeState {
        self.shared.lock().unwrap().handshake
    }

    /// The host only accepts pushed input reports after it has disabled
    /// the USB timeout.
    pub(crate) fn reporting_enabled(&self) -> bool {
        self.handshake() >= HandshakeState::DisableUsbTimeout
    }

    pub(crate) fn with_controller<R>(&self, f: impl FnOnce(&mut ControllerState) -> R) -> R {
        f(&mut self.shared.lock().unwrap().controller)
    }

    /// Dispatch one inbound record and collect the replies it warrants.
    pub(crate) fn handle_report(&self, buf: &[u8]) -> Dispatch {
        let mut dispatch = Dispatch::default();
        let Some(&report_id) = buf.first() else {
            return dispatch;
        };
        match ReportType::from_primitive(report_id) {
            Some(ReportType::UsbOutputReport) => self.handle_init_request(buf, &mut dispatch),
            Some(ReportType::CommandOutputReport) => {
                self.handle_rumble(buf, &mut dispatch);
                self.handle_subcommand(buf, &mut dispatch);
            }
            Some(ReportType::BasicOutputReport) => self.handle_rumble(buf, &mut dispatch),
            _ => log::warn!("unhandled report id {report_id:#04x}"),
        }
        dispatch
    }

    fn handle_init_request(&self, buf: &[u8], dispatch: &mut Dispatch) {
        if buf.len() < 2 {
            log::warn!("truncated usb init request: {buf:02x?}");
            return;
        }
        let Some(subtype) = UsbInitSubtype::from_primitive(buf[1]) else {
            log::warn!("unsupported usb init subtype ({:#04x})", buf[1]);
            return;
        };
        let mut shared = self.shared.lock().unwrap();
        match subtype {
            UsbInitSubtype::RequestMac => {
                let mut reply = vec![buf[1], 0x00, DEVICE_TYPE_PRO_CONTROLLER];
                reply.extend_from_slice(&self.identity.mac);
                dispatch.replies.push((ReportType::UsbInputReport, reply));
                shared.handshake = HandshakeState::Mac;
            }
            UsbInitSubtype::Handshake => {
                dispatch
                    .replies
                    .push((ReportType::UsbInputReport, vec![buf[1]]));
                // The real device's handshake is two-phase: a second
                // handshake after the baud rate switch is the final one.
                shared.handshake = if shared.handshake == HandshakeState::BaudRate {
                    HandshakeState::Handshake2
                } else {
                    HandshakeState::Handshake
                };
            }
            UsbInitSubtype::BaudRate => {
                dispatch
                    .replies
                    .push((ReportType::UsbInputReport, vec![buf[1]]));
                shared.handshake = HandshakeState::BaudRate;
            }
            UsbInitSubtype::DisableUsbTimeout => {
                shared.usb_timeout = false;
                shared.handshake = HandshakeState::DisableUsbTimeout;
                log::info!("usb timeout disabled, input reporting unlocked");
            }
            UsbInitSubtype::EnableUsbTimeout => {
                shared.usb_timeout = true;
                shared.handshake = HandshakeState::EnableUsbTimeout;
            }
        }
    }

    /// Every runtime report carries an 8-byte rumble block at bytes
    /// 2..10, independent of whatever subcommand follows it.
    fn handle_rumble(&self, buf: &[u8], dispatch: &mut Dispatch) {
        if buf.len() < 10 {
            log::warn!("truncated rumble report: {buf:02x?}");
            return;
        }
        match decode_rumble(&buf[2..10]) {
            Ok(Some(sample)) => {
                dispatch.vibration = Some(GamepadVibration {
                    duration_ms: RUMBLE_DURATION_MS,
                    start_delay_ms: RUMBLE_START_DELAY_MS,
                    strong_magnitude: sample.strong_magnitude,
                    weak_magnitude: sample.weak_magnitude,
                });
            }
            Ok(None) => {}
            Err(e) => log::warn!("dropping rumble sample: {e}"),
        }
    }

    fn handle_subcommand(&self, buf: &[u8], dispatch: &mut Dispatch) {
        if buf.len() < 16 {
            log::warn!("truncated subcommand report: {buf:02x?}");
            return;
        }
        let code = buf[10];
        let Some(subcommand) = Subcommand::from_primitive(code) else {
            log::warn!("unsupported subcommand ({code:#04x}): {:02x?}", &buf[11..16]);
            return;
        };
        let controller = match self.build_controller_report() {
            Ok(report) => report,
            Err(e) => {
                log::error!("failed to pack controller report: {e:?}");
                return;
            }
        };
        let reply = match subcommand {
            Subcommand::BluetoothManualPairing => {
                // Wired transport only; a fixed "done" reply satisfies
                // the host without any pairing state.
                command_reply(controller, ack_byte(code, true), code, &[&[0x03]])
            }
            Subcommand::RequestDeviceInfo => command_reply(
                controller,
                ack_byte(code, true),
                code,
                &[
                    // Firmware version and device type of a wired Pro
                    // Controller.
                    &[0x03, 0x48, 0x03, 0x02],
                    &self.identity.mac_reversed,
                    &[0x03, 0x02],
                ],
            ),
            Subcommand::SetInputReportMode => {
                if buf[11] == 0x30 {
                    log::debug!("standard full mode, pushing current state at 60Hz");
                }
                command_reply(controller, ack_byte(code, false), code, &[])
            }
            Subcommand::TriggerButtonsElapsedTime => {
                // Ack byte from a capture of the real device.
                command_reply(controller, 0x83, code, &[])
            }
            Subcommand::SetHciState
            | Subcommand::SetShipmentLowPowerState
            | Subcommand::SetPlayerLights
            | Subcommand::SetHomeLight => {
                command_reply(controller, ack_byte(code, false), code, &[])
            }
            Subcommand::ReadSpi => {
                let (offset, bank, len) = (buf[11], buf[12], buf[15]);
                match self.flash.read(bank, offset, len) {
                    Ok(slice) => command_reply(
                        controller,
                        ack_byte(code, true),
                        code,
                        &[&buf[11..16], slice],
                    ),
                    Err(e) => {
                        log::warn!("spi read rejected: {e}");
                        command_reply(controller, 0x00, code, &[])
                    }
                }
            }
            Subcommand::SetNfcIrMcuConfiguration => {
                // Ack byte and payload from a capture of the real device.
                command_reply(controller, 0xa0, code, &[&NFC_IR_MCU_STATE])
            }
            Subcommand::Subcommand33 => command_reply(controller, 0x80, code, &[&[0x03]]),
            Subcommand::EnableImu => {
                self.with_controller(|c| c.imu_enable = buf[11]);
                command_reply(controller, ack_byte(code, false), code, &[])
            }
            Subcommand::SetImuSensitivity => {
                self.with_controller(|c| {
                    c.imu_sensitivity.gyro_sensitivity = buf[11];
                    c.imu_sensitivity.accelerometer_sensitivity = buf[12];
                    c.imu_sensitivity.gyro_performance_rate = buf[13];
                    c.imu_sensitivity.accelerometer_filter_bandwidth = buf[14];
                });
                command_reply(controller, ack_byte(code, false), code, &[])
            }
            Subcommand::EnableVibration => {
                self.with_controller(|c| c.vibration_enable = buf[11]);
                log::debug!(
                    "vibration {}",
                    if buf[11] == 0 { "disabled" } else { "enabled" }
                );
                command_reply(controller, ack_byte(code, false), code, &[])
            }
        };
        dispatch.replies.push((ReportType::CommandInputReport, reply));
    }

    /// Pack the current controller state into the 12-byte wire report.
    pub(crate) fn build_controller_report(&self) -> Result<[u8; 12], PackingError> {
        let timestamp = unix_millis_byte();
        let shared = self.shared.lock().unwrap();
        shared.controller.to_packed_report(timestamp).pack()
    }
}

/// Assemble a 0x21 subcommand ack payload: current controller report,
/// ack byte, subcommand byte, then any reply data.
fn command_reply(controller: [u8; 12], ack: u8, subcommand: u8, data: &[&[u8]]) -> Vec<u8> {
    let mut reply = Vec::with_capacity(REPORT_LEN - 1);
    reply.extend_from_slice(&controller);
    reply.push(ack);
    reply.push(subcommand);
    for part in data {
        reply.extend_from_slice(part);
    }
    reply
}

fn unix_millis_byte() -> u8 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| (d.as_millis() % 256) as u8)
        .unwrap_or(0)
}

/// Frame the payload and write it as one record. A short write is an
/// error; the stream is useless for this session afterwards.
pub(crate) async fn write_record<W>(
    writer: &tokio::sync::Mutex<W>,
    report_type: ReportType,
    payload: &[u8],
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let record = encode_report(report_type.to_primitive(), payload)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let mut writer = writer.lock().await;
    let written = writer.write(&record).await?;
    if written != record.len() {
        return Err(io::Error::new(
            io::ErrorKind::WriteZero,
            format!("partial report write: {written} of {} bytes", record.len()),
        ));
    }
    writer.flush().await?;
    log::trace!("wrote {record:02x?}");
    Ok(())
}

/// Reader half of a session: blocks on the device stream, dispatches
/// each record through the engine and writes the replies. Any I/O error
/// ends the session; the caller tears it down and may start over.
pub(crate) async fn read_report_loop<R, W>(
    engine: ProtocolEngine,
    mut reader: R,
    writer: Arc<tokio::sync::Mutex<W>>,
    vibration_tx: Arc<Mutex<Option<mpsc::Sender<GamepadVibration>>>>,
    mut stop_rx: watch::Receiver<bool>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    // USB reset magic: tells the host any previous session is gone.
    if let Err(e) = write_record(&writer, ReportType::UsbInputReport, &[0x01, 0x00, 0x03]).await {
        log::error!("failed to write usb reset report: {e}");
        return;
    }
    let mut buf = [0u8; REPORT_LEN];
    loop {
        let read = tokio::select! {
            _ = stop_rx.changed() => return,
            result = reader.read(&mut buf) => result,
        };
        let n = match read {
            Ok(0) => {
                log::info!("gadget device stream closed");
                return;
            }
            Ok(n) => n,
            Err(e) => {
                log::error!("failed to read request report from gadget device: {e}");
                return;
            }
        };
        log::trace!("read {:02x?}", &buf[..n]);
        let dispatch = engine.handle_report(&buf[..n]);
        for (report_type, payload) in dispatch.replies {
            if let Err(e) = write_record(&writer, report_type, &payload).await {
                log::error!(
                    "failed to write response report ({:#04x}): {e}",
                    report_type.to_primitive()
                );
                return;
            }
        }
        if let Some(event) = dispatch.vibration {
            let tx = vibration_tx.lock().unwrap().clone();
            if let Some(tx) = tx {
                if let Err(e) = tx.send(event).await {
                    log::warn!("failed to forward vibration event: {e}");
                }
            }
        }
    }
}

/// Writer half of a session: pushes the current controller state at
/// 60 Hz once the handshake allows it. Skipped ticks are not buffered.
pub(crate) async fn write_report_loop<W>(
    engine: ProtocolEngine,
    writer: Arc<tokio::sync::Mutex<W>>,
    mut stop_rx: watch::Receiver<bool>,
) where
    W: AsyncWrite + Unpin,
{
    let mut ticker = interval(REPORT_INTERVAL);
    loop {
        tokio::select! {
            _ = stop_rx.changed() => return,
            _ = ticker.tick() => {}
        }
        if !engine.reporting_enabled() {
            continue;
        }
        let report = match engine.build_controller_report() {
            Ok(report) => report,
            Err(e) => {
                log::error!("failed to pack controller report: {e:?}");
                return;
            }
        };
        if let Err(e) = write_record(&writer, ReportType::BasicInputReport, &report).await {
            log::error!("failed to write input report: {e}");
            return;
        }
    }
}

/// An emulated wired Pro Controller.
pub struct SwitchProDevice {
    engine: ProtocolEngine,
    gadget: UsbGadgetHid,
    device_path: PathBuf,
    stop_tx: Option<watch::Sender<bool>>,
    vibration_tx: Arc<Mutex<Option<mpsc::Sender<GamepadVibration>>>>,
}

impl SwitchProDevice {
    pub fn new(config: &RelayConfig) -> Result<Self, GamepadError> {
        let identity = DeviceIdentity::from_hex(&config.mac_addr)?;
        let factory = hex::decode(&config.spi_rom_6000)
            .map_err(|source| GamepadError::InvalidSpiRom { bank: 0x60, source })?;
        let user = hex::decode(&config.spi_rom_8000)
            .map_err(|source| GamepadError::InvalidSpiRom { bank: 0x80, source })?;
        let device_path = config
            .device_path
            .clone()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DEVICE_PATH));
        Ok(Self {
            engine: ProtocolEngine::new(identity, SpiFlash::new(factory, user)),
            gadget: UsbGadgetHid::new(gadget_params(config)),
            device_path,
            stop_tx: None,
            vibration_tx: Arc::new(Mutex::new(None)),
        })
    }

    /// Configure the USB gadget: clear stale state from a previous run,
    /// build the configfs tree, bind the UDC and wait for the hidg
    /// device file to appear.
    pub async fn setup(&self) -> Result<(), GamepadError> {
        self.gadget.cleanup()?;
        tokio::time::sleep(GADGET_SETTLE_DELAY).await;
        self.gadget.setup()?;
        self.gadget.enable()?;
        tokio::time::sleep(GADGET_SETTLE_DELAY).await;
        if !self.device_path.exists() {
            return Err(GamepadError::MissingDeviceFile(self.device_path.clone()));
        }
        Ok(())
    }

    /// Open the gadget device stream and spawn the two session loops.
    pub fn start(&mut self) -> Result<(), GamepadError> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.device_path)?;
        let writer_file = file.try_clone()?;
        let reader = tokio::fs::File::from_std(file);
        let writer = Arc::new(tokio::sync::Mutex::new(tokio::fs::File::from_std(
            writer_file,
        )));
        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(read_report_loop(
            self.engine.clone(),
            reader,
            writer.clone(),
            self.vibration_tx.clone(),
            stop_rx.clone(),
        ));
        tokio::spawn(write_report_loop(self.engine.clone(), writer, stop_rx));
        self.stop_tx = Some(stop_tx);
        Ok(())
    }

    /// Signal both loops to stop at their next blocking point, then
    /// tear the gadget down.
    pub fn stop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
        self.stop_vibration_listener();
        if let Err(e) = self.gadget.disable() {
            log::warn!("failed to disable usb gadget: {e}");
        }
        if let Err(e) = self.gadget.cleanup() {
            log::warn!("failed to clean up usb gadget: {e}");
        }
    }

    pub fn update_state(&self, event: &GamepadStateEvent) {
        self.engine.with_controller(|c| c.update(event));
    }

    pub fn press(&self, buttons: &[Button]) {
        self.engine.with_controller(|c| {
            for button in buttons {
                c.press(*button);
            }
        });
    }

    pub fn release(&self, buttons: &[Button]) {
        self.engine.with_controller(|c| {
            for button in buttons {
                c.release(*button);
            }
        });
    }

    pub fn stick_l(&self, x: f64, y: f64) {
        self.engine.with_controller(|c| c.set_stick_l(x, y));
    }

    pub fn stick_r(&self, x: f64, y: f64) {
        self.engine.with_controller(|c| c.set_stick_r(x, y));
    }

    /// Register the vibration callback. Decoded rumble events are
    /// bridged through a channel so the handler runs off the reader
    /// loop's critical path.
    pub fn start_vibration_listener<F>(&self, handler: F)
    where
        F: Fn(GamepadVibration) + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel(8);
        *self.vibration_tx.lock().unwrap() = Some(tx);
        tokio::spawn(async move {
            log::info!("vibration listener started");
            while let Some(event) = rx.recv().await {
                handler(event);
            }
            log::info!("vibration listener stopped");
        });
    }

    pub fn stop_vibration_listener(&self) {
        self.vibration_tx.lock().unwrap().take();
    }
}

fn gadget_params(config: &RelayConfig) -> UsbGadgetHidParams {
    UsbGadgetHidParams {
        configs_home: config
            .configs_home
            .clone()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIGS_HOME)),
        gadget_name: "procon".to_string(),
        id_vendor: format!("0x{VID:04x}"),
        id_product: format!("0x{PID:04x}"),
        bcd_device: "0x0200".to_string(),
        bcd_usb: "0x0200".to_string(),
        b_max_packet_size0: "64".to_string(),
        b_device_protocol: "0".to_string(),
        b_device_subclass: "0".to_string(),
        b_device_class: "0".to_string(),
        serial: SERIAL.to_string(),
        product: PRODUCT.to_string(),
        manufacturer: MANUFACTURER.to_string(),
        config_name: "c".to_string(),
        config_number: "1".to_string(),
        config_string: CONFIGURATION.to_string(),
        bm_attributes: "0xa0".to_string(),
        max_power: "500".to_string(),
        function_instance: "usb0".to_string(),
        protocol: "0".to_string(),
        subclass: "0".to_string(),
        report_length: CONTROLLER_DESCRIPTOR.len().to_string(),
        report_desc: CONTROLLER_DESCRIPTOR.to_vec(),
        udc: config.udc.clone().unwrap_or_default(),
    }
}
