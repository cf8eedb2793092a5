//! Event queue: unbounded FIFO from input callbacks to the sender thread.
//!
//! Any number of [`EventProducer`]s may enqueue concurrently; exactly one
//! [`EventConsumer`] drains the queue at a time.  There is no priority, no
//! coalescing, and no backpressure: `enqueue` never blocks and never drops.
//!
//! # Backlog
//!
//! Because the queue is unbounded, a stalled transport lets it grow without
//! limit.  The queue keeps a pending count and logs a warning every time the
//! backlog reaches another multiple of the configured threshold, so the
//! growth is visible in the logs long before it matters.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    mpsc, Arc, Mutex, MutexGuard,
};

use stylus_core::ProtocolEvent;
use thiserror::Error;
use tracing::{trace, warn};

/// Error type for the consumer side.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    /// Every producer is gone; nothing can arrive any more.
    #[error("event queue closed")]
    Closed,
    /// A previous consumer panicked while holding the queue.
    #[error("event queue poisoned by a panicked consumer")]
    Poisoned,
}

#[derive(Debug)]
struct Backlog {
    pending: AtomicUsize,
    warn_step: usize,
}

impl Backlog {
    fn pushed(&self) {
        let pending = self.pending.fetch_add(1, Ordering::Relaxed) + 1;
        if self.warn_step > 0 && pending % self.warn_step == 0 {
            warn!(pending, "event backlog growing; transport is not keeping up");
        }
    }

    fn popped(&self) {
        self.pending.fetch_sub(1, Ordering::Relaxed);
    }
}

/// The queue itself.  Cheap to share: producers and the consumer are
/// separate handles.
#[derive(Debug)]
pub struct EventQueue {
    producer: EventProducer,
    rx: Arc<Mutex<mpsc::Receiver<ProtocolEvent>>>,
}

impl EventQueue {
    /// Creates an empty queue.  `backlog_warn_threshold` of 0 disables the
    /// backlog warning.
    pub fn new(backlog_warn_threshold: usize) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            producer: EventProducer {
                tx,
                backlog: Arc::new(Backlog {
                    pending: AtomicUsize::new(0),
                    warn_step: backlog_warn_threshold,
                }),
            },
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    pub fn producer(&self) -> EventProducer {
        self.producer.clone()
    }

    pub fn enqueue(&self, event: ProtocolEvent) {
        self.producer.enqueue(event);
    }

    /// Returns a consumer handle.  Only one consumer can hold the queue at a
    /// time; see [`EventConsumer::lock`].
    pub fn consumer(&self) -> EventConsumer {
        EventConsumer {
            rx: Arc::clone(&self.rx),
            backlog: Arc::clone(&self.producer.backlog),
        }
    }

    /// Events enqueued but not yet dequeued.
    pub fn len(&self) -> usize {
        self.producer.backlog.pending.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Enqueue side; clone freely across threads.
#[derive(Debug, Clone)]
pub struct EventProducer {
    tx: mpsc::Sender<ProtocolEvent>,
    backlog: Arc<Backlog>,
}

impl EventProducer {
    /// Appends `event` to the queue.  Never blocks.
    pub fn enqueue(&self, event: ProtocolEvent) {
        // Count before sending so the consumer can never decrement first.
        self.backlog.pushed();
        if let Err(mpsc::SendError(event)) = self.tx.send(event) {
            self.backlog.popped();
            warn!("event queue dropped, discarding {event:?}");
        } else {
            trace!("enqueued event");
        }
    }
}

/// Dequeue side.
#[derive(Debug, Clone)]
pub struct EventConsumer {
    rx: Arc<Mutex<mpsc::Receiver<ProtocolEvent>>>,
    backlog: Arc<Backlog>,
}

impl EventConsumer {
    /// Takes exclusive hold of the queue.  Blocks while another consumer
    /// holds it.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Poisoned`] if a previous holder panicked.
    pub fn lock(&self) -> Result<HeldQueue<'_>, QueueError> {
        let rx = self.rx.lock().map_err(|_| QueueError::Poisoned)?;
        Ok(HeldQueue {
            rx,
            backlog: &self.backlog,
        })
    }
}

/// Exclusive hold on the queue; the holder is the sole consumer.
pub struct HeldQueue<'a> {
    rx: MutexGuard<'a, mpsc::Receiver<ProtocolEvent>>,
    backlog: &'a Backlog,
}

impl HeldQueue<'_> {
    /// Blocks until the next event arrives.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] once every producer has been dropped.
    pub fn recv(&self) -> Result<ProtocolEvent, QueueError> {
        let event = self.rx.recv().map_err(|_| QueueError::Closed)?;
        self.backlog.popped();
        Ok(event)
    }
}
