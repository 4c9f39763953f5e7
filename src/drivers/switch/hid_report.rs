//! Wire format of the Switch Pro Controller USB HID protocol.
//!
//! Sources:
//! - https://github.com/dekuNukem/Nintendo_Switch_Reverse_Engineering/blob/master/bluetooth_hid_notes.md
//! - https://github.com/dekuNukem/Nintendo_Switch_Reverse_Engineering/blob/master/USB-HID-Notes.md
use packed_struct::prelude::*;
use thiserror::Error;

/// Every record exchanged with the gadget device is exactly this long.
/// Byte 0 is the report ID, the rest is report payload.
pub const REPORT_LEN: usize = 64;

/// Maximum payload that fits in a record after the report ID byte.
pub const MAX_PAYLOAD_LEN: usize = REPORT_LEN - 1;

/// Device type reported in the MAC reply of the init handshake.
pub const DEVICE_TYPE_PRO_CONTROLLER: u8 = 0x03;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("payload of {0} bytes does not fit in a {REPORT_LEN}-byte record")]
    PayloadTooLong(usize),
}

/// Frame a report ID and payload into a fixed-size record, right-padded
/// with zero bytes.
pub fn encode_report(report_id: u8, payload: &[u8]) -> Result<[u8; REPORT_LEN], EncodeError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(EncodeError::PayloadTooLong(payload.len()));
    }
    let mut record = [0u8; REPORT_LEN];
    record[0] = report_id;
    record[1..1 + payload.len()].copy_from_slice(payload);
    Ok(record)
}

/// Ack byte for a subcommand reply: the high bit, or'ed with the
/// subcommand code when the reply carries data.
pub fn ack_byte(subcommand: u8, has_data: bool) -> u8 {
    if has_data {
        0x80 | subcommand
    } else {
        0x80
    }
}

#[derive(PrimitiveEnum_u8, Clone, Copy, PartialEq, Debug)]
pub enum ReportType {
    /// Host -> controller: rumble data plus an embedded subcommand.
    CommandOutputReport = 0x01,
    /// Host -> controller: rumble data only.
    BasicOutputReport = 0x10,
    /// Controller -> host: subcommand acknowledgement.
    CommandInputReport = 0x21,
    /// Controller -> host: periodic full input report.
    BasicInputReport = 0x30,
    /// Host -> controller: USB init request.
    UsbOutputReport = 0x80,
    /// Controller -> host: USB init reply.
    UsbInputReport = 0x81,
}

/// Sub-types of the 0x80 report, used during USB initialization.
#[derive(PrimitiveEnum_u8, Clone, Copy, PartialEq, Debug)]
pub enum UsbInitSubtype {
    RequestMac = 0x01,
    Handshake = 0x02,
    BaudRate = 0x03,
    DisableUsbTimeout = 0x04,
    EnableUsbTimeout = 0x05,
}

/// UART subcommands multiplexed inside 0x01 reports.
#[derive(PrimitiveEnum_u8, Clone, Copy, PartialEq, Debug)]
pub enum Subcommand {
    BluetoothManualPairing = 0x01,
    RequestDeviceInfo = 0x02,
    SetInputReportMode = 0x03,
    TriggerButtonsElapsedTime = 0x04,
    SetHciState = 0x06,
    SetShipmentLowPowerState = 0x08,
    ReadSpi = 0x10,
    SetNfcIrMcuConfiguration = 0x21,
    SetPlayerLights = 0x30,
    Subcommand33 = 0x33,
    SetHomeLight = 0x38,
    EnableImu = 0x40,
    SetImuSensitivity = 0x41,
    EnableVibration = 0x48,
}

#[derive(PrimitiveEnum_u8, Clone, Copy, PartialEq, Debug, Default)]
pub enum BatteryLevel {
    Empty = 0,
    Critical = 1,
    Low = 2,
    Medium = 3,
    #[default]
    Full = 4,
}

#[derive(PackedStruct, Debug, Copy, Clone, PartialEq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "1")]
pub struct BatteryConnection {
    /// Battery level in the high nibble, LSB of the nibble is "charging".
    #[packed_field(bits = "0..=2", ty = "enum")]
    pub battery_level: BatteryLevel,
    #[packed_field(bits = "3")]
    pub charging: bool,
    /// Connection info. Low bit set means Switch/USB powered.
    #[packed_field(bits = "4..=7")]
    pub conn_info: u8,
}

impl Default for BatteryConnection {
    fn default() -> Self {
        Self {
            battery_level: BatteryLevel::Full,
            charging: false,
            conn_info: 1,
        }
    }
}

/// The three bit-packed button bytes of the input report. Bit positions
/// are dictated by the host's report descriptor.
#[derive(PackedStruct, Debug, Default, Copy, Clone, PartialEq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "3")]
pub struct ButtonStatus {
    // byte 0 (right side)
    #[packed_field(bits = "7")]
    pub y: bool,
    #[packed_field(bits = "6")]
    pub x: bool,
    #[packed_field(bits = "5")]
    pub b: bool,
    #[packed_field(bits = "4")]
    pub a: bool,
    #[packed_field(bits = "3")]
    pub right_sr: bool,
    #[packed_field(bits = "2")]
    pub right_sl: bool,
    #[packed_field(bits = "1")]
    pub r: bool,
    #[packed_field(bits = "0")]
    pub zr: bool,

    // byte 1 (shared)
    #[packed_field(bits = "15")]
    pub minus: bool,
    #[packed_field(bits = "14")]
    pub plus: bool,
    #[packed_field(bits = "13")]
    pub r_stick: bool,
    #[packed_field(bits = "12")]
    pub l_stick: bool,
    #[packed_field(bits = "11")]
    pub home: bool,
    #[packed_field(bits = "10")]
    pub capture: bool,
    #[packed_field(bits = "9")]
    pub _unused: bool,
    #[packed_field(bits = "8")]
    pub charging_grip: bool,

    // byte 2 (left side)
    #[packed_field(bits = "23")]
    pub down: bool,
    #[packed_field(bits = "22")]
    pub up: bool,
    #[packed_field(bits = "21")]
    pub right: bool,
    #[packed_field(bits = "20")]
    pub left: bool,
    #[packed_field(bits = "19")]
    pub left_sr: bool,
    #[packed_field(bits = "18")]
    pub left_sl: bool,
    #[packed_field(bits = "17")]
    pub l: bool,
    #[packed_field(bits = "16")]
    pub zl: bool,
}

/// The 12-byte controller state block used both as the periodic 0x30
/// report payload and as the prefix of every 0x21 subcommand ack.
#[derive(PackedStruct, Debug, Default, Copy, Clone, PartialEq)]
#[packed_struct(bit_numbering = "msb0", size_bytes = "12")]
pub struct PackedControllerReport {
    /// Millisecond timestamp truncated to one byte, wraps every 256 ms.
    #[packed_field(bytes = "0")]
    pub timestamp: u8,
    #[packed_field(bytes = "1")]
    pub info: BatteryConnection,
    #[packed_field(bytes = "2..=4")]
    pub buttons: ButtonStatus,
    #[packed_field(bytes = "5..=7")]
    pub left_stick: [u8; 3],
    #[packed_field(bytes = "8..=10")]
    pub right_stick: [u8; 3],
    /// Rumble motor status. Not observable in this emulation, always 0.
    #[packed_field(bytes = "11")]
    pub vibrator_report: u8,
}

/// Map a stick axis in [-1.0, 1.0] to the unsigned 12-bit wire range.
pub fn axis_to_u12(value: f64) -> u16 {
    ((1.0 + value) * 2047.5).round() as u16
}

/// Pack one stick's 12-bit x/y pair into its 3 wire bytes.
pub fn pack_stick(x: u16, y: u16) -> [u8; 3] {
    [
        (x & 0xff) as u8,
        (((y << 4) & 0xf0) | ((x >> 8) & 0x0f)) as u8,
        ((y >> 4) & 0xff) as u8,
    ]
}

/// Inverse of [pack_stick], used by tests and host-side tooling.
pub fn unpack_stick(bytes: &[u8; 3]) -> (u16, u16) {
    let x = ((bytes[1] as u16 & 0x0f) << 8) | bytes[0] as u16;
    let y = ((bytes[2] as u16) << 4) | (bytes[1] as u16 >> 4);
    (x, y)
}
