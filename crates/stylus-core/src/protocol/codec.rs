//! Frame codec for StylusSync protocol events.
//!
//! Wire format of one frame (every row is a 3-byte Control Change message):
//! ```text
//! ctl  EventType     0 = motion, 1 = button
//! data X   msb/mid/lsb
//! data Y   msb/mid/lsb
//! data P   msb/mid/lsb
//! ctl  ButtonId      button frames only, id + 1
//! ctl  ButtonState   button frames only, 127 = down
//! data Sequence      7-bit frame counter
//! ctl  DataComplete  127
//! ```
//! A 16-bit value is spread over three 7-bit values: bits 15–9, bits 8–2,
//! and bits 1–0 shifted into the top of the last byte.  The spread is
//! lossless; [`join_7bit`] is its exact inverse.

use thiserror::Error;

use crate::protocol::messages::{
    Channel, Controller, EventType, MidiMessage, ProtocolEvent, BUTTON_FRAME_LEN,
    BUTTON_STATE_DOWN, BUTTON_STATE_UP, DATA_COMPLETE_VALUE, MESSAGE_SIZE, MOTION_FRAME_LEN,
};
use crate::protocol::sequence::SequenceCounter;

/// Errors that can occur while interpreting wire messages.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The byte slice is shorter than one message.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The status byte is not a Control Change.
    #[error("not a control change message: status 0x{0:02X}")]
    NotControlChange(u8),

    /// The channel nibble is neither the data nor the control channel.
    #[error("unknown channel: {0}")]
    UnknownChannel(u8),

    /// The controller number is not part of the frame grammar.
    #[error("unknown controller {controller} on channel {channel}")]
    UnknownController { channel: u8, controller: u8 },

    /// A known controller arrived on the other channel.
    #[error("controller {controller:?} is not valid on the {channel:?} channel")]
    WrongChannel {
        controller: Controller,
        channel: Channel,
    },
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Splits a 16-bit value into `(msb, mid, lsb)` 7-bit wire values.
///
/// # Examples
///
/// ```rust
/// use stylus_core::protocol::codec::{split_7bit, join_7bit};
///
/// assert_eq!(split_7bit(65535), (127, 127, 96));
/// assert_eq!(join_7bit(127, 127, 96), 65535);
/// ```
pub fn split_7bit(value: u16) -> (u8, u8, u8) {
    let v = u32::from(value);
    let msb = (v >> 9) & 0x7F;
    let mid = (v >> 2) & 0x7F;
    let lsb = (v << 5) & 0x7F;
    (msb as u8, mid as u8, lsb as u8)
}

/// Rebuilds a 16-bit value from its three 7-bit wire values.
pub fn join_7bit(msb: u8, mid: u8, lsb: u8) -> u16 {
    let v = (u32::from(msb & 0x7F) << 9)
        | (u32::from(mid & 0x7F) << 2)
        | (u32::from(lsb & 0x7F) >> 5);
    v as u16
}

/// Encodes one event into its frame, advancing `sequence` for motion and
/// button events.
///
/// The disconnect sentinel encodes to an empty frame and leaves the counter
/// untouched.
///
/// # Examples
///
/// ```rust
/// use stylus_core::protocol::{encode_event, ProtocolEvent, SequenceCounter};
///
/// let seq = SequenceCounter::new();
/// let frame = encode_event(&ProtocolEvent::Motion { x: 1, y: 2, pressure: 3 }, &seq);
/// assert_eq!(frame.len(), 12);
/// assert!(encode_event(&ProtocolEvent::Disconnect, &seq).is_empty());
/// assert_eq!(seq.current(), 1);
/// ```
pub fn encode_event(event: &ProtocolEvent, sequence: &SequenceCounter) -> Vec<MidiMessage> {
    match *event {
        ProtocolEvent::Motion { x, y, pressure } => {
            let mut frame = Vec::with_capacity(MOTION_FRAME_LEN);
            frame.push(MidiMessage::field(Controller::EventType, EventType::Motion as u8));
            push_position(&mut frame, x, y, pressure);
            frame.push(MidiMessage::field(Controller::Sequence, sequence.advance()));
            frame.push(MidiMessage::field(Controller::DataComplete, DATA_COMPLETE_VALUE));
            frame
        }
        ProtocolEvent::Button {
            x,
            y,
            pressure,
            button_id,
            down,
        } => {
            let mut frame = Vec::with_capacity(BUTTON_FRAME_LEN);
            frame.push(MidiMessage::field(Controller::EventType, EventType::Button as u8));
            push_position(&mut frame, x, y, pressure);
            frame.push(MidiMessage::field(Controller::ButtonId, button_wire_id(button_id)));
            let state = if down { BUTTON_STATE_DOWN } else { BUTTON_STATE_UP };
            frame.push(MidiMessage::field(Controller::ButtonState, state));
            frame.push(MidiMessage::field(Controller::Sequence, sequence.advance()));
            frame.push(MidiMessage::field(Controller::DataComplete, DATA_COMPLETE_VALUE));
            frame
        }
        ProtocolEvent::Disconnect => Vec::new(),
    }
}

/// Maps a button id to its wire value: `-1 → 0, 0 → 1, 1 → 2, 2 → 3`.
pub fn button_wire_id(button_id: i8) -> u8 {
    (i16::from(button_id) + 1) as u8 & 0x7F
}

/// Inverse of [`button_wire_id`].
pub fn button_id_from_wire(value: u8) -> i8 {
    (i16::from(value & 0x7F) - 1) as i8
}

/// Parses a raw 3-byte slice into a message.
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] for slices shorter than one
/// message.
pub fn read_message(bytes: &[u8]) -> Result<MidiMessage, ProtocolError> {
    let raw: [u8; MESSAGE_SIZE] = bytes
        .get(..MESSAGE_SIZE)
        .and_then(|b| b.try_into().ok())
        .ok_or(ProtocolError::InsufficientData {
            needed: MESSAGE_SIZE,
            available: bytes.len(),
        })?;
    Ok(MidiMessage::from_bytes(raw))
}

/// Resolves which frame field a message carries.
///
/// # Errors
///
/// Returns [`ProtocolError`] when the message is not a Control Change, uses an
/// unknown channel or controller, or carries a controller on the wrong channel.
pub fn classify(msg: &MidiMessage) -> Result<(Controller, u8), ProtocolError> {
    if !msg.is_control_change() {
        return Err(ProtocolError::NotControlChange(msg.status()));
    }
    let channel =
        Channel::try_from(msg.channel()).map_err(|_| ProtocolError::UnknownChannel(msg.channel()))?;
    let controller =
        Controller::try_from(msg.controller()).map_err(|_| ProtocolError::UnknownController {
            channel: msg.channel(),
            controller: msg.controller(),
        })?;
    if controller.channel() != channel {
        return Err(ProtocolError::WrongChannel {
            controller,
            channel,
        });
    }
    Ok((controller, msg.value()))
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn push_position(frame: &mut Vec<MidiMessage>, x: i16, y: i16, pressure: i16) {
    push_spread(frame, x, [Controller::XMsb, Controller::XMid, Controller::XLsb]);
    push_spread(frame, y, [Controller::YMsb, Controller::YMid, Controller::YLsb]);
    push_spread(
        frame,
        pressure,
        [
            Controller::PressureMsb,
            Controller::PressureMid,
            Controller::PressureLsb,
        ],
    );
}

fn push_spread(frame: &mut Vec<MidiMessage>, value: i16, controllers: [Controller; 3]) {
    // Reinterpret as unsigned: negative scaled values wrap into the top half.
    let (msb, mid, lsb) = split_7bit(value as u16);
    frame.push(MidiMessage::field(controllers[0], msb));
    frame.push(MidiMessage::field(controllers[1], mid));
    frame.push(MidiMessage::field(controllers[2], lsb));
}

// ── Tests ─────────────────────────────────────────────────────────────────────
