//! Touch sample sources.
//!
//! A source produces [`TouchSample`]s on its own thread and hands them over
//! through an `mpsc` channel, so the producer never blocks on translation or
//! transmission.
//!
//! # Testability
//!
//! The [`SampleSource`] trait allows tests to inject synthetic samples via
//! [`mock::MockSampleSource`]; the binary reads JSON lines from stdin with
//! [`jsonl::JsonLinesSource`].

use std::sync::mpsc;

use stylus_core::TouchSample;

pub mod jsonl;
pub mod mock;

/// Error type for sample source operations.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("sample source has already been started")]
    AlreadyStarted,
    #[error("failed to spawn reader thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Trait abstracting touch sample production.
pub trait SampleSource: Send {
    /// Starts the source and returns a receiver for its samples.  The channel
    /// closes when the source is exhausted or stopped.
    fn start(&self) -> Result<mpsc::Receiver<TouchSample>, SourceError>;

    /// Stops producing samples.
    fn stop(&self);
}
