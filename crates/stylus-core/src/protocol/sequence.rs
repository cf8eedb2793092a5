//! Thread-safe 7-bit sequence counter for frame numbering.
//!
//! Every motion or button frame carries a sequence value on the `Sequence`
//! controller.  Because a MIDI data byte only has 7 usable bits, the value
//! wraps from 127 back to 0.  The receiver compares consecutive values to
//! detect frames dropped in transit.
//!
//! Motion and button frames share one counter; the disconnect sentinel never
//! advances it.
//!
//! # Thread safety
//!
//! The counter uses `AtomicU8` internally.  The raw byte wraps at 256, which
//! is a multiple of 128, so masking the low seven bits after every
//! `fetch_add` gives a correct modulo-128 sequence without a compare-and-swap
//! loop.

use std::sync::atomic::{AtomicU8, Ordering};

/// Mask selecting the seven bits a sequence value may occupy.
pub const SEQUENCE_MASK: u8 = 0x7F;

/// A thread-safe counter producing wire sequence numbers in `0..=127`.
///
/// [`advance`](Self::advance) increments first and returns the new value, so
/// the first frame encoded by a fresh counter carries sequence 1 and the Nth
/// frame carries `N mod 128`.
///
/// # Examples
///
/// ```rust
/// use stylus_core::protocol::SequenceCounter;
///
/// let counter = SequenceCounter::new();
/// assert_eq!(counter.advance(), 1);
/// assert_eq!(counter.advance(), 2);
/// assert_eq!(counter.current(), 2);
/// ```
#[derive(Debug)]
pub struct SequenceCounter {
    inner: AtomicU8,
}

impl SequenceCounter {
    /// Creates a new counter whose current value is 0.
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Creates a counter whose current value is `value` (masked to 7 bits).
    pub fn starting_at(value: u8) -> Self {
        Self {
            inner: AtomicU8::new(value & SEQUENCE_MASK),
        }
    }

    /// Increments the counter and returns the new 7-bit value.
    ///
    /// `Ordering::Relaxed` is sufficient: the value only labels frames, it
    /// does not publish any other memory.
    pub fn advance(&self) -> u8 {
        self.inner
            .fetch_add(1, Ordering::Relaxed)
            .wrapping_add(1)
            & SEQUENCE_MASK
    }

    /// Returns the value embedded in the most recent frame without advancing.
    pub fn current(&self) -> u8 {
        self.inner.load(Ordering::Relaxed) & SEQUENCE_MASK
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the sequence value expected after `previous`.
pub fn next_sequence(previous: u8) -> u8 {
    previous.wrapping_add(1) & SEQUENCE_MASK
}
