//! Touch-to-MIDI bridge.
//!
//! [`StylusBridge`] takes [`ProtocolEvent`](stylus_core::ProtocolEvent)s from
//! any thread, encodes them as control-change frames, and writes them to the
//! first USB MIDI device it finds.  The `stylus-bridge` binary and the
//! integration tests both build on this library.

pub mod application;
pub mod infrastructure;

pub use application::bridge::{BridgeOptions, StylusBridge};
pub use application::session::{ConnectionState, SessionError};
pub use application::status::{StatusEvent, StatusListener};
