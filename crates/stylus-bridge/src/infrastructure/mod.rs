//! Infrastructure layer for the bridge.
//!
//! Contains OS-facing adapters: MIDI transports, touch sample sources, and
//! configuration file storage.
//!
//! **Dependency rule**: this layer may depend on `stylus_core`, but MUST NOT
//! import from `application`.

pub mod midi;
pub mod sample_source;
pub mod storage;
