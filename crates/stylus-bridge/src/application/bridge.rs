//! `StylusBridge`: the public face of the pipeline.
//!
//! Owns the event queue, the sequence counter, the port slot shared by the
//! connection context and the sender thread, and the status notifier.
//! Producers only ever call [`StylusBridge::enqueue`]; lifecycle is driven by
//! [`StylusBridge::start`] and [`StylusBridge::stop`].
//!
//! # Threads
//!
//! ```text
//! producers ──enqueue──▶ EventQueue ──▶ stylus-sender ──send──▶ MidiPort
//!                                            ▲
//!                                     PortSlot (watch)
//!                                            │
//!                    connection context (tokio task) ──▶ stylus-status ──▶ listener
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use stylus_core::{ProtocolEvent, SequenceCounter};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::application::event_queue::{EventProducer, EventQueue};
use crate::application::sender_loop::{spawn_sender, SenderLoop};
use crate::application::session::{spawn_session, ConnectionState, PortSlot, SessionHandle};
use crate::application::status::{StatusListener, StatusNotifier};
use crate::infrastructure::midi::MidiService;
use crate::infrastructure::storage::config::BridgeSection;

/// Tunables for a [`StylusBridge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeOptions {
    /// Upper bound on each of the two waits in [`StylusBridge::stop`].
    pub stop_timeout: Duration,
    /// Queue length step at which a backlog warning is logged; 0 disables it.
    pub backlog_warn_threshold: usize,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            stop_timeout: Duration::from_millis(1000),
            backlog_warn_threshold: 4096,
        }
    }
}

impl From<&BridgeSection> for BridgeOptions {
    fn from(section: &BridgeSection) -> Self {
        Self {
            stop_timeout: section.stop_timeout(),
            backlog_warn_threshold: section.backlog_warn_threshold,
        }
    }
}

#[derive(Default)]
struct Lifecycle {
    sender: Option<SenderLoop>,
    session: Option<SessionHandle>,
}

pub struct StylusBridge {
    runtime: Handle,
    service: Arc<dyn MidiService>,
    options: BridgeOptions,
    queue: EventQueue,
    sequence: Arc<SequenceCounter>,
    port: Arc<PortSlot>,
    state: Arc<RwLock<ConnectionState>>,
    notifier: StatusNotifier,
    lifecycle: Mutex<Lifecycle>,
}

impl StylusBridge {
    /// Creates a stopped bridge.  The connection context will run on
    /// `runtime` once started.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the status notifier thread cannot be spawned.
    pub fn new(
        runtime: Handle,
        service: Arc<dyn MidiService>,
        options: BridgeOptions,
    ) -> std::io::Result<Self> {
        let (port, _) = watch::channel(None);
        Ok(Self {
            runtime,
            service,
            options,
            queue: EventQueue::new(options.backlog_warn_threshold),
            sequence: Arc::new(SequenceCounter::new()),
            port: Arc::new(port),
            state: Arc::new(RwLock::new(ConnectionState::Uninitialized)),
            notifier: StatusNotifier::spawn()?,
            lifecycle: Mutex::new(Lifecycle::default()),
        })
    }

    /// Queues `event` for transmission.  Never blocks.  While no device is
    /// connected the sender discards what it dequeues.
    pub fn enqueue(&self, event: ProtocolEvent) {
        self.queue.enqueue(event);
    }

    /// A producer handle that can be moved into input callbacks.
    pub fn producer(&self) -> EventProducer {
        self.queue.producer()
    }

    /// Starts the sender thread and the connection context.  Idempotent:
    /// whichever of the two is already running is left alone, so calling
    /// `start` after `stop` brings the bridge back up.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the sender thread cannot be spawned.
    pub fn start(&self) -> std::io::Result<()> {
        let mut lifecycle = self.lifecycle();

        if lifecycle.sender.as_ref().map_or(true, SenderLoop::is_finished) {
            lifecycle.sender = Some(spawn_sender(
                self.queue.consumer(),
                self.port.subscribe(),
                Arc::clone(&self.sequence),
                self.notifier.handle(),
            )?);
            debug!("sender thread spawned");
        }

        if lifecycle.session.as_ref().map_or(true, SessionHandle::is_finished) {
            lifecycle.session = Some(spawn_session(
                &self.runtime,
                Arc::clone(&self.service),
                Arc::clone(&self.port),
                Arc::clone(&self.state),
                self.notifier.handle(),
            ));
            debug!("connection context spawned");
        }

        info!("bridge started");
        Ok(())
    }

    /// Stops the sender thread, then releases the port and device.
    ///
    /// Each step waits at most `stop_timeout`.  A connection context that
    /// misses it is aborted and the port and device are released anyway, so
    /// the bridge always ends `Disconnected` with nothing bound.
    ///
    /// Safe to call when never started, never connected, or already
    /// stopped.  No `Disconnected` notification is posted for a deliberate
    /// stop.
    ///
    /// Blocks the calling thread; do not call it from a runtime worker.
    pub fn stop(&self) {
        let mut lifecycle = self.lifecycle();

        if let Some(sender) = lifecycle.sender.take() {
            // A sentinel left behind by an exited sender would end the next one.
            if !sender.is_finished() {
                self.queue.enqueue(ProtocolEvent::Disconnect);
            }
            sender.join_timeout(self.options.stop_timeout);
        }

        if let Some(session) = lifecycle.session.take() {
            session.stop(self.options.stop_timeout);
        }

        info!("bridge stopped");
    }

    /// Whether a port is currently bound.
    pub fn is_connected(&self) -> bool {
        self.port.borrow().is_some()
    }

    pub fn state(&self) -> ConnectionState {
        self.state.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Sets or clears the listener for connected / disconnected / error
    /// notifications.
    pub fn set_status_listener(&self, listener: Option<Arc<dyn StatusListener>>) {
        self.notifier.set_listener(listener);
    }

    /// The counter stamping outgoing frames.  It survives stop/start.
    pub fn sequence(&self) -> &SequenceCounter {
        &self.sequence
    }

    /// Events waiting for the sender thread.
    pub fn backlog(&self) -> usize {
        self.queue.len()
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
