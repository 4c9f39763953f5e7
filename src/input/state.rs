//! In-memory snapshot of the emulated controller: button flags, stick
//! positions and the advisory IMU/vibration fields set by subcommands.
use crate::drivers::switch::hid_report::{
    axis_to_u12, pack_stick, ButtonStatus, PackedControllerReport,
};
use crate::input::capability::Button;
use crate::input::event::GamepadStateEvent;

#[derive(Debug, Clone, Copy, Default)]
pub struct ButtonState {
    pub a: bool,
    pub b: bool,
    pub x: bool,
    pub y: bool,
    pub l: bool,
    pub r: bool,
    pub zl: bool,
    pub zr: bool,
    pub minus: bool,
    pub plus: bool,
    pub home: bool,
    pub capture: bool,
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
    pub left_sl: bool,
    pub left_sr: bool,
    pub right_sl: bool,
    pub right_sr: bool,
    pub charging_grip: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StickState {
    pub x: f64,
    pub y: f64,
    pub pressed: bool,
}

/// IMU sensitivity bytes stored by the 0x41 subcommand. Opaque: any
/// byte value is accepted, nothing consumes them (motion telemetry is
/// not emulated).
#[derive(Debug, Clone, Copy, Default)]
pub struct ImuSensitivity {
    pub gyro_sensitivity: u8,
    pub accelerometer_sensitivity: u8,
    pub gyro_performance_rate: u8,
    pub accelerometer_filter_bandwidth: u8,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ControllerState {
    pub buttons: ButtonState,
    pub left_stick: StickState,
    pub right_stick: StickState,
    pub imu_sensitivity: ImuSensitivity,
    pub imu_enable: u8,
    pub vibration_enable: u8,
}

impl ControllerState {
    pub fn press(&mut self, button: Button) {
        self.set_button(button, true);
    }

    pub fn release(&mut self, button: Button) {
        self.set_button(button, false);
    }

    fn set_button(&mut self, button: Button, pressed: bool) {
        match button {
            Button::A => self.buttons.a = pressed,
            Button::B => self.buttons.b = pressed,
            Button::X => self.buttons.x = pressed,
            Button::Y => self.buttons.y = pressed,
            Button::L => self.buttons.l = pressed,
            Button::R => self.buttons.r = pressed,
            Button::Zl => self.buttons.zl = pressed,
            Button::Zr => self.buttons.zr = pressed,
            Button::Minus => self.buttons.minus = pressed,
            Button::Plus => self.buttons.plus = pressed,
            Button::Home => self.buttons.home = pressed,
            Button::Capture => self.buttons.capture = pressed,
            Button::Left => self.buttons.left = pressed,
            Button::Right => self.buttons.right = pressed,
            Button::Up => self.buttons.up = pressed,
            Button::Down => self.buttons.down = pressed,
            Button::LeftSl => self.buttons.left_sl = pressed,
            Button::LeftSr => self.buttons.left_sr = pressed,
            Button::RightSl => self.buttons.right_sl = pressed,
            Button::RightSr => self.buttons.right_sr = pressed,
            Button::ChargingGrip => self.buttons.charging_grip = pressed,
            Button::StickL => self.left_stick.pressed = pressed,
            Button::StickR => self.right_stick.pressed = pressed,
        }
    }

    /// Set the left stick position. The Y axis sign convention of the
    /// remote input source is inverted relative to the wire format.
    pub fn set_stick_l(&mut self, x: f64, y: f64) {
        self.left_stick.x = x;
        self.left_stick.y = -y;
    }

    pub fn set_stick_r(&mut self, x: f64, y: f64) {
        self.right_stick.x = x;
        self.right_stick.y = -y;
    }

    /// Apply a full snapshot from the remote input source. Buttons and
    /// axes use the standard web gamepad ordering; indexes this
    /// controller has no mapping for are logged and skipped.
    pub fn update(&mut self, event: &GamepadStateEvent) {
        for (i, pressed) in event.buttons.iter().copied().enumerate() {
            let button = match i {
                0 => Button::B,
                1 => Button::A,
                2 => Button::Y,
                3 => Button::X,
                4 => Button::L,
                5 => Button::R,
                6 => Button::Zl,
                7 => Button::Zr,
                8 => Button::Minus,
                9 => Button::Plus,
                10 => Button::StickL,
                11 => Button::StickR,
                12 => Button::Up,
                13 => Button::Down,
                14 => Button::Left,
                15 => Button::Right,
                16 => Button::Home,
                17 => Button::Capture,
                _ => {
                    log::warn!("ignoring unsupported button index {i}");
                    continue;
                }
            };
            self.set_button(button, pressed);
        }
        for (i, value) in event.axes.iter().copied().enumerate() {
            match i {
                0 => self.left_stick.x = value,
                1 => self.left_stick.y = -value,
                2 => self.right_stick.x = value,
                3 => self.right_stick.y = -value,
                _ => log::warn!("ignoring unsupported axis index {i}"),
            }
        }
    }

    /// Build the 12-byte wire report for the current state.
    pub fn to_packed_report(&self, timestamp: u8) -> PackedControllerReport {
        let b = &self.buttons;
        PackedControllerReport {
            timestamp,
            buttons: ButtonStatus {
                a: b.a,
                b: b.b,
                x: b.x,
                y: b.y,
                l: b.l,
                r: b.r,
                zl: b.zl,
                zr: b.zr,
                minus: b.minus,
                plus: b.plus,
                home: b.home,
                capture: b.capture,
                left: b.left,
                right: b.right,
                up: b.up,
                down: b.down,
                left_sl: b.left_sl,
                left_sr: b.left_sr,
                right_sl: b.right_sl,
                right_sr: b.right_sr,
                charging_grip: b.charging_grip,
                l_stick: self.left_stick.pressed,
                r_stick: self.right_stick.pressed,
                _unused: false,
            },
            left_stick: pack_stick(axis_to_u12(self.left_stick.x), axis_to_u12(self.left_stick.y)),
            right_stick: pack_stick(
                axis_to_u12(self.right_stick.x),
                axis_to_u12(self.right_stick.y),
            ),
            ..Default::default()
        }
    }
}
