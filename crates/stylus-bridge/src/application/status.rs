//! Status notifier: connected / disconnected / error events for the UI.
//!
//! Notifications are posted from the connection context and the sender
//! thread, but the listener always runs on the notifier's own thread
//! (`stylus-status`).  A slow listener therefore never stalls transmission
//! or device handling, and listeners see events in the order they were
//! posted.

use std::sync::{mpsc, Arc, PoisonError, RwLock};
use std::thread;

use tracing::debug;

/// One notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// A device was opened and its port bound; carries the display name.
    Connected(String),
    /// The connected device went away.
    Disconnected,
    Error(String),
}

/// Receiver of status notifications, typically a UI.
#[cfg_attr(test, mockall::automock)]
pub trait StatusListener: Send + Sync {
    fn on_connected(&self, device_name: &str);
    fn on_disconnected(&self);
    fn on_error(&self, message: &str);
}

type ListenerSlot = Arc<RwLock<Option<Arc<dyn StatusListener>>>>;

/// Owns the notifier thread and the current listener.
pub struct StatusNotifier {
    tx: mpsc::Sender<StatusEvent>,
    listener: ListenerSlot,
}

impl StatusNotifier {
    /// Spawns the notifier thread.  The thread exits once the notifier and
    /// every [`StatusHandle`] have been dropped.
    pub fn spawn() -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel::<StatusEvent>();
        let listener: ListenerSlot = Arc::new(RwLock::new(None));
        let slot = Arc::clone(&listener);

        thread::Builder::new()
            .name("stylus-status".to_string())
            .spawn(move || {
                for event in rx {
                    let current = slot.read().unwrap_or_else(PoisonError::into_inner).clone();
                    match current {
                        Some(listener) => dispatch(listener.as_ref(), &event),
                        None => debug!("no status listener for {event:?}"),
                    }
                }
            })?;

        Ok(Self { tx, listener })
    }

    /// Returns a cheap handle for posting notifications.
    pub fn handle(&self) -> StatusHandle {
        StatusHandle {
            tx: self.tx.clone(),
        }
    }

    /// Replaces the listener.  Events already queued go to the new one.
    pub fn set_listener(&self, listener: Option<Arc<dyn StatusListener>>) {
        *self.listener.write().unwrap_or_else(PoisonError::into_inner) = listener;
    }
}

fn dispatch(listener: &dyn StatusListener, event: &StatusEvent) {
    match event {
        StatusEvent::Connected(name) => listener.on_connected(name),
        StatusEvent::Disconnected => listener.on_disconnected(),
        StatusEvent::Error(message) => listener.on_error(message),
    }
}

/// Posts notifications to the notifier thread.
#[derive(Debug, Clone)]
pub struct StatusHandle {
    tx: mpsc::Sender<StatusEvent>,
}

impl StatusHandle {
    /// A handle wired to a plain channel instead of a notifier thread.
    pub fn channel() -> (Self, mpsc::Receiver<StatusEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }

    pub fn connected(&self, device_name: &str) {
        self.post(StatusEvent::Connected(device_name.to_string()));
    }

    pub fn disconnected(&self) {
        self.post(StatusEvent::Disconnected);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.post(StatusEvent::Error(message.into()));
    }

    fn post(&self, event: StatusEvent) {
        if let Err(mpsc::SendError(event)) = self.tx.send(event) {
            debug!("status notifier gone, dropping {event:?}");
        }
    }
}
