use serde::{Deserialize, Serialize};

/// Every button the emulated controller can report, including the two
/// stick clicks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Button {
    A,
    B,
    X,
    Y,
    Left,
    Right,
    Up,
    Down,
    Plus,
    Minus,
    Home,
    Capture,
    StickL,
    StickR,
    L,
    R,
    Zl,
    Zr,
    LeftSl,
    LeftSr,
    RightSl,
    RightSr,
    ChargingGrip,
}
