/// Full gamepad snapshot delivered by the remote input source. Buttons
/// and axes are positional, in the standard web gamepad ordering.
#[derive(Debug, Clone, Default)]
pub struct GamepadStateEvent {
    pub buttons: Vec<bool>,
    pub axes: Vec<f64>,
}

/// A decoded rumble event delivered to the registered vibration
/// listener.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GamepadVibration {
    pub duration_ms: u32,
    pub start_delay_ms: u32,
    pub strong_magnitude: f64,
    pub weak_magnitude: f64,
}
