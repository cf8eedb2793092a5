//! # stylus-core
//!
//! Shared library for StylusSync containing the wire protocol codec, the 7-bit
//! sequence counter, the receiver-side frame assembler, and the translation of
//! raw touch samples into protocol events.
//!
//! It has zero dependencies on OS APIs, MIDI services, or threads.
//!
//! # Architecture overview
//!
//! StylusSync turns a touch surface (a tablet or phone screen with a stylus)
//! into an external MIDI-class input device.  Every hover update, pen contact,
//! and side-button press travels to the computer as a short burst of MIDI
//! Control Change messages.
//!
//! - **`protocol`** – How events become bytes.  Each [`ProtocolEvent`] encodes
//!   to a *frame* of 3-byte Control Change messages (12 for motion, 14 for
//!   buttons).  Coordinates are spread losslessly over three 7-bit values.
//!
//! - **`domain`** – Pure input logic.  The [`SampleTranslator`] normalises raw
//!   samples to the 16-bit coordinate space and tracks proximity and side
//!   button state, producing the event stream the bridge transmits.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `stylus_core::ProtocolEvent` instead of `stylus_core::protocol::messages::ProtocolEvent`.
pub use domain::sample::{ButtonMask, SampleAction, ToolType, TouchSample};
pub use domain::translate::{SampleTranslator, SurfaceSize};
pub use protocol::codec::{encode_event, ProtocolError};
pub use protocol::frame::{DecodedFrame, FrameAssembler, FrameKind};
pub use protocol::messages::{MidiMessage, ProtocolEvent};
pub use protocol::sequence::SequenceCounter;
