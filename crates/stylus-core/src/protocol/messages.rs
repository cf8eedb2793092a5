//! All StylusSync protocol event and message types.
//!
//! Every event travels as a sequence of MIDI Control Change messages.  The
//! controller numbers and channel assignments below are part of the wire
//! contract shared with the receiving computer and must never change.

use serde::{Deserialize, Serialize};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Size of every wire message in bytes.
pub const MESSAGE_SIZE: usize = 3;

/// Status nibble of a MIDI Control Change message.
pub const CONTROL_CHANGE: u8 = 0xB0;

/// Number of messages in a motion frame.
pub const MOTION_FRAME_LEN: usize = 12;

/// Number of messages in a button frame.
pub const BUTTON_FRAME_LEN: usize = 14;

/// Value carried by the `DataComplete` controller to close a frame.
pub const DATA_COMPLETE_VALUE: u8 = 127;

/// `ButtonState` value for a pressed button.
pub const BUTTON_STATE_DOWN: u8 = 127;

/// `ButtonState` value for a released button.
pub const BUTTON_STATE_UP: u8 = 0;

/// Button id for the in-range/proximity pseudo button.
pub const BUTTON_PROXIMITY: i8 = -1;

/// Button id for the primary contact (pen tip or finger).
pub const BUTTON_CONTACT: i8 = 0;

/// Button id for the first stylus side button.
pub const BUTTON_STYLUS_PRIMARY: i8 = 1;

/// Button id for the second stylus side button.
pub const BUTTON_STYLUS_SECONDARY: i8 = 2;

// ── Channels ──────────────────────────────────────────────────────────────────

/// Logical MIDI channel (0-indexed) a message travels on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Channel {
    /// Coordinate, pressure, and sequence fields.
    Data = 0,
    /// Event type, button id/state, and frame-complete markers.
    Control = 1,
}

impl TryFrom<u8> for Channel {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Channel::Data),
            1 => Ok(Channel::Control),
            _ => Err(()),
        }
    }
}

// ── Controller numbers ────────────────────────────────────────────────────────

/// Controller numbers assigned to each frame field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Controller {
    // Data channel
    XMsb = 1,
    XMid = 2,
    XLsb = 3,
    YMsb = 4,
    YMid = 5,
    YLsb = 6,
    PressureMsb = 7,
    PressureMid = 8,
    PressureLsb = 9,
    Sequence = 10,
    // Control channel
    EventType = 20,
    ButtonId = 21,
    ButtonState = 22,
    DataComplete = 30,
}

impl Controller {
    /// The channel this controller is transmitted on.
    pub fn channel(self) -> Channel {
        match self {
            Controller::EventType
            | Controller::ButtonId
            | Controller::ButtonState
            | Controller::DataComplete => Channel::Control,
            _ => Channel::Data,
        }
    }
}

impl TryFrom<u8> for Controller {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            1 => Ok(Controller::XMsb),
            2 => Ok(Controller::XMid),
            3 => Ok(Controller::XLsb),
            4 => Ok(Controller::YMsb),
            5 => Ok(Controller::YMid),
            6 => Ok(Controller::YLsb),
            7 => Ok(Controller::PressureMsb),
            8 => Ok(Controller::PressureMid),
            9 => Ok(Controller::PressureLsb),
            10 => Ok(Controller::Sequence),
            20 => Ok(Controller::EventType),
            21 => Ok(Controller::ButtonId),
            22 => Ok(Controller::ButtonState),
            30 => Ok(Controller::DataComplete),
            _ => Err(()),
        }
    }
}

/// Value of the `EventType` controller identifying the frame kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventType {
    Motion = 0,
    Button = 1,
}

// ── Events ────────────────────────────────────────────────────────────────────

/// An event travelling from the input callbacks to the sender.
///
/// Coordinates and pressure are the 16-bit scaled values produced by the
/// sample translator.  They are reinterpreted as unsigned on the wire, so
/// values past `i16::MAX` wrap without loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolEvent {
    /// Hover or drag update with no button semantics.
    Motion { x: i16, y: i16, pressure: i16 },
    /// A press or release transition.
    ///
    /// `button_id` is `-1` for proximity, `0` for the primary contact, and
    /// `1`/`2` for the stylus side buttons.
    Button {
        x: i16,
        y: i16,
        pressure: i16,
        button_id: i8,
        down: bool,
    },
    /// Shutdown sentinel for the sender loop.  Never transmitted.
    Disconnect,
}

impl ProtocolEvent {
    /// Returns `true` for the shutdown sentinel.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, ProtocolEvent::Disconnect)
    }

    /// Number of wire messages this event encodes to.
    pub fn frame_len(&self) -> usize {
        match self {
            ProtocolEvent::Motion { .. } => MOTION_FRAME_LEN,
            ProtocolEvent::Button { .. } => BUTTON_FRAME_LEN,
            ProtocolEvent::Disconnect => 0,
        }
    }
}

// ── Wire message ──────────────────────────────────────────────────────────────

/// One 3-byte MIDI Control Change message: `[status, controller, value]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MidiMessage([u8; MESSAGE_SIZE]);

impl MidiMessage {
    /// Builds a Control Change message, masking every field to its MIDI width.
    pub fn control_change(channel: u8, controller: u8, value: u8) -> Self {
        Self([
            CONTROL_CHANGE | (channel & 0x0F),
            controller & 0x7F,
            value & 0x7F,
        ])
    }

    /// Builds a message for a named field.
    pub fn field(controller: Controller, value: u8) -> Self {
        Self::control_change(controller.channel() as u8, controller as u8, value)
    }

    /// Wraps raw bytes without validation.
    pub fn from_bytes(bytes: [u8; MESSAGE_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; MESSAGE_SIZE] {
        &self.0
    }

    pub fn status(&self) -> u8 {
        self.0[0]
    }

    /// Low nibble of the status byte.
    pub fn channel(&self) -> u8 {
        self.0[0] & 0x0F
    }

    pub fn controller(&self) -> u8 {
        self.0[1]
    }

    pub fn value(&self) -> u8 {
        self.0[2]
    }

    /// Returns `true` when the status byte carries the Control Change nibble.
    pub fn is_control_change(&self) -> bool {
        self.0[0] & 0xF0 == CONTROL_CHANGE
    }
}

impl AsRef<[u8]> for MidiMessage {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_change_sets_status_nibble_and_channel() {
        let msg = MidiMessage::control_change(1, 20, 0);
        assert_eq!(msg.as_bytes(), &[0xB1, 20, 0]);
    }

    #[test]
    fn test_control_change_masks_out_of_range_fields() {
        // Channel 0x1F keeps only its low nibble, controller/value lose bit 7.
        let msg = MidiMessage::control_change(0x1F, 0xFF, 0x80);
        assert_eq!(msg.as_bytes(), &[0xBF, 0x7F, 0x00]);
    }

    #[test]
    fn test_field_routes_controllers_to_their_channel() {
        assert_eq!(MidiMessage::field(Controller::XMsb, 5).channel(), 0);
        assert_eq!(MidiMessage::field(Controller::Sequence, 5).channel(), 0);
        assert_eq!(MidiMessage::field(Controller::EventType, 1).channel(), 1);
        assert_eq!(MidiMessage::field(Controller::DataComplete, 127).channel(), 1);
    }

    #[test]
    fn test_controller_try_from_rejects_unassigned_numbers() {
        assert_eq!(Controller::try_from(30), Ok(Controller::DataComplete));
        assert!(Controller::try_from(11).is_err());
        assert!(Controller::try_from(0).is_err());
    }

    #[test]
    fn test_frame_len_per_variant() {
        let motion = ProtocolEvent::Motion { x: 0, y: 0, pressure: 0 };
        let button = ProtocolEvent::Button {
            x: 0,
            y: 0,
            pressure: 0,
            button_id: BUTTON_CONTACT,
            down: true,
        };
        assert_eq!(motion.frame_len(), MOTION_FRAME_LEN);
        assert_eq!(button.frame_len(), BUTTON_FRAME_LEN);
        assert_eq!(ProtocolEvent::Disconnect.frame_len(), 0);
        assert!(ProtocolEvent::Disconnect.is_disconnect());
    }

    #[test]
    fn test_is_control_change_rejects_note_on() {
        let note_on = MidiMessage::from_bytes([0x90, 60, 100]);
        assert!(!note_on.is_control_change());
        assert!(MidiMessage::control_change(0, 1, 1).is_control_change());
    }
}
