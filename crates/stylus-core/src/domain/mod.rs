//! Input domain for StylusSync.
//!
//! Pure logic with no OS, threading, or MIDI dependencies.  The input source
//! (a platform touch API, a recorded session, a test) hands over
//! [`sample::TouchSample`]s; the [`translate::SampleTranslator`] turns them
//! into the protocol events the bridge queues for transmission.

/// Raw touch and hover samples as produced by an input source.
pub mod sample;

/// Sample-to-event translation: normalisation, proximity, and side buttons.
pub mod translate;
