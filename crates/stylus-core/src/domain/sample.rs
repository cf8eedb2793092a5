//! Touch samples as delivered by an input source.

use serde::{Deserialize, Serialize};

/// The kind of tool that produced a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolType {
    #[default]
    Unknown,
    Finger,
    Stylus,
    Mouse,
    Eraser,
}

/// What happened to the pointer in this sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleAction {
    /// The stylus came into hover range.
    HoverEnter,
    /// The stylus moved while hovering.
    HoverMove,
    /// The stylus left hover range.
    HoverExit,
    /// The pointer touched the surface.
    Down,
    /// The pointer moved while touching.
    Move,
    /// The pointer lifted off the surface.
    Up,
    /// The gesture was aborted by the platform.
    Cancel,
}

/// Bitmask of buttons held on the tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ButtonMask(pub u8);

impl ButtonMask {
    /// First stylus barrel button.
    pub const STYLUS_PRIMARY: u8 = 1 << 0;
    /// Second stylus barrel button.
    pub const STYLUS_SECONDARY: u8 = 1 << 1;

    pub fn contains(self, flag: u8) -> bool {
        self.0 & flag != 0
    }
}

/// One pointer sample.
///
/// `x`/`y` are in surface units (pixels or logical units, matching the
/// surface size given to the translator).  `pressure` is normalised, with
/// 1.0 as nominal full pressure; some devices report up to 2.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TouchSample {
    pub action: SampleAction,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub pressure: f32,
    #[serde(default)]
    pub tool: ToolType,
    #[serde(default)]
    pub pointer_id: u32,
    #[serde(default)]
    pub buttons: ButtonMask,
}

impl TouchSample {
    /// Convenience constructor for a stylus sample with no buttons held.
    pub fn stylus(action: SampleAction, x: f32, y: f32, pressure: f32) -> Self {
        Self {
            action,
            x,
            y,
            pressure,
            tool: ToolType::Stylus,
            pointer_id: 0,
            buttons: ButtonMask::default(),
        }
    }
}
