//! Sender loop: the single consumer of the event queue.
//!
//! Runs on a dedicated thread (`stylus-sender`).  For each event, in queue
//! order:
//!
//! - `Disconnect` ends the loop;
//! - with no port bound, the event is discarded without encoding, so the
//!   sequence counter only numbers frames that were actually written;
//! - otherwise the event is encoded and each 3-byte message is written
//!   through the port.  A failed write is reported once and the rest of
//!   that frame is abandoned; the loop carries on with the next event.
//!
//! The port is read from the session's slot for every event, so binding and
//! unbinding take effect between frames, never inside one.

use std::sync::{mpsc as std_mpsc, Arc};
use std::thread;
use std::time::Duration;

use stylus_core::{encode_event, ProtocolEvent, SequenceCounter};
use tracing::{error, info, trace, warn};

use crate::application::event_queue::EventConsumer;
use crate::application::session::{PortWatch, SessionError};
use crate::application::status::StatusHandle;
use crate::infrastructure::midi::MidiPort;

/// A running sender thread.
pub struct SenderLoop {
    handle: thread::JoinHandle<()>,
    exited: std_mpsc::Receiver<()>,
}

/// Fires when the sender thread ends, however it ends.
struct ExitSignal(std_mpsc::Sender<()>);

impl Drop for ExitSignal {
    fn drop(&mut self) {
        let _ = self.0.send(());
    }
}

/// Spawns the sender thread.
///
/// # Errors
///
/// Returns the OS error if the thread cannot be created.
pub fn spawn_sender(
    consumer: EventConsumer,
    port: PortWatch,
    sequence: Arc<SequenceCounter>,
    status: StatusHandle,
) -> std::io::Result<SenderLoop> {
    let (signal, exited) = std_mpsc::channel();
    let handle = thread::Builder::new()
        .name("stylus-sender".to_string())
        .spawn(move || {
            let _signal = ExitSignal(signal);
            run(&consumer, &port, &sequence, &status);
        })?;
    Ok(SenderLoop { handle, exited })
}

impl SenderLoop {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits up to `timeout` for the thread to exit and joins it.  Returns
    /// `false` on timeout; the thread is then left detached.
    pub fn join_timeout(self, timeout: Duration) -> bool {
        match self.exited.recv_timeout(timeout) {
            Ok(()) | Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                if self.handle.join().is_err() {
                    error!("sender thread panicked");
                }
                true
            }
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                warn!("sender thread did not exit within {timeout:?}");
                false
            }
        }
    }
}

fn run(
    consumer: &EventConsumer,
    port: &PortWatch,
    sequence: &SequenceCounter,
    status: &StatusHandle,
) {
    // Held for the life of the thread: a restarted sender waits here until
    // the previous one is gone.
    let queue = match consumer.lock() {
        Ok(queue) => queue,
        Err(e) => {
            error!("sender thread cannot take the queue: {e}");
            return;
        }
    };
    info!("sender thread running");

    loop {
        let event = match queue.recv() {
            Ok(event) => event,
            Err(e) => {
                error!("sender thread stopping: {e}");
                break;
            }
        };
        if event.is_disconnect() {
            break;
        }
        let Some(port) = port.borrow().clone() else {
            trace!("no port bound; discarding {event:?}");
            continue;
        };
        transmit(port.as_ref(), &event, sequence, status);
    }

    info!("sender thread exited");
}

/// Encodes `event` and writes it message by message.  The first failed
/// write is reported and the rest of the frame is abandoned.
fn transmit(
    port: &dyn MidiPort,
    event: &ProtocolEvent,
    sequence: &SequenceCounter,
    status: &StatusHandle,
) {
    for message in encode_event(event, sequence) {
        if let Err(e) = port.send(message.as_bytes()) {
            let error = SessionError::Transmit(e);
            warn!("{error}; abandoning the rest of the frame");
            status.error(error.to_string());
            return;
        }
    }
}
