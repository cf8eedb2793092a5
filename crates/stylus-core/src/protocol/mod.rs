//! Protocol module containing event types, the frame codec, and sequencing.

pub mod codec;
pub mod frame;
pub mod messages;
pub mod sequence;

pub use codec::{encode_event, ProtocolError};
pub use frame::{DecodedFrame, FrameAssembler, MessageReader};
pub use messages::*;
pub use sequence::SequenceCounter;
