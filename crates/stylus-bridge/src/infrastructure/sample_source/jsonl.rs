//! JSON-lines sample source.
//!
//! One [`TouchSample`] per line:
//!
//! ```text
//! {"action":"hover_enter","x":120.0,"y":80.5,"tool":"stylus"}
//! {"action":"down","x":121.0,"y":81.0,"pressure":0.42,"tool":"stylus"}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped.  Malformed lines are
//! logged and skipped; they never stop the stream.

use std::io::BufRead;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    mpsc, Arc, Mutex,
};
use std::thread;

use stylus_core::TouchSample;
use tracing::{debug, warn};

use super::{SampleSource, SourceError};

/// Reads samples from any buffered reader on a dedicated thread.
pub struct JsonLinesSource<R> {
    reader: Mutex<Option<R>>,
    stopped: Arc<AtomicBool>,
    rejected: Arc<AtomicU64>,
}

impl<R: BufRead + Send + 'static> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: Mutex::new(Some(reader)),
            stopped: Arc::new(AtomicBool::new(false)),
            rejected: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Lines that could not be parsed so far.
    pub fn rejected_lines(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

impl<R: BufRead + Send + 'static> SampleSource for JsonLinesSource<R> {
    fn start(&self) -> Result<mpsc::Receiver<TouchSample>, SourceError> {
        let reader = self
            .reader
            .lock()
            .map_err(|_| SourceError::AlreadyStarted)?
            .take()
            .ok_or(SourceError::AlreadyStarted)?;
        let (tx, rx) = mpsc::channel();
        let stopped = Arc::clone(&self.stopped);
        let rejected = Arc::clone(&self.rejected);

        thread::Builder::new()
            .name("stylus-samples".to_string())
            .spawn(move || read_lines(reader, &tx, &stopped, &rejected))
            .map_err(SourceError::Spawn)?;
        Ok(rx)
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }
}

fn read_lines<R: BufRead>(
    reader: R,
    tx: &mpsc::Sender<TouchSample>,
    stopped: &AtomicBool,
    rejected: &AtomicU64,
) {
    for (index, line) in reader.lines().enumerate() {
        if stopped.load(Ordering::Relaxed) {
            break;
        }
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("sample input failed: {e}");
                break;
            }
        };
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match serde_json::from_str::<TouchSample>(trimmed) {
            Ok(sample) => {
                if tx.send(sample).is_err() {
                    break;
                }
            }
            Err(e) => {
                rejected.fetch_add(1, Ordering::Relaxed);
                warn!("skipping malformed sample on line {}: {e}", index + 1);
            }
        }
    }
    debug!("sample reader exiting");
}
