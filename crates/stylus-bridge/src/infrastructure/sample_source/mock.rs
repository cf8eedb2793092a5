//! Mock sample source for unit testing.
//!
//! Allows tests to inject synthetic [`TouchSample`]s without a touch screen
//! or an input file.

use std::sync::{
    mpsc::{self, Sender},
    Arc, Mutex,
};

use stylus_core::TouchSample;

use super::{SampleSource, SourceError};

/// A mock implementation of [`SampleSource`] that allows tests to inject samples.
#[derive(Default)]
pub struct MockSampleSource {
    sender: Arc<Mutex<Option<Sender<TouchSample>>>>,
}

impl MockSampleSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Injects a synthetic sample, as if produced by the touch screen.
    ///
    /// Panics if `start()` has not been called or if `stop()` has been called.
    pub fn inject_sample(&self, sample: TouchSample) {
        let guard = self.sender.lock().expect("lock poisoned");
        match guard.as_ref() {
            Some(sender) => sender
                .send(sample)
                .expect("receiver has been dropped; call start() first"),
            None => panic!("MockSampleSource::inject_sample called before start()"),
        }
    }
}

impl SampleSource for MockSampleSource {
    fn start(&self) -> Result<mpsc::Receiver<TouchSample>, SourceError> {
        let (tx, rx) = mpsc::channel();
        *self.sender.lock().expect("lock poisoned") = Some(tx);
        Ok(rx)
    }

    fn stop(&self) {
        // Dropping the sender closes the channel.
        *self.sender.lock().expect("lock poisoned") = None;
    }
}
