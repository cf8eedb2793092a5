//! Connection session: discovery, opening, and teardown of one MIDI device.
//!
//! The session runs as a single tokio task, the *connection context*.  It
//! is the only writer of the connection state and of the port slot the
//! sender thread reads from, except when a stop times out: the handle then
//! aborts the task and releases the port and device itself.
//!
//! ```text
//! Uninitialized ──feature missing──► FeatureUnsupported
//!       │
//!       └──service ok──► Discovering ◄──────────────┐
//!                          │  ▲                     │
//!           USB device ────┘  │ open failed /       │ device removed
//!           found or added    │ no input port       │
//!                          ▼  │                     │
//!                        Opening ──open ok──► Connected ──stop──► Disconnected
//! ```
//!
//! Only USB devices are opened; other transports (virtual ports, built-in
//! synth ports) are ignored.  While a device is opening or connected, newly
//! attached devices are ignored rather than pre-empting the current one.
//!
//! Opens run as their own tasks and report back through a channel, so a
//! slow open never blocks hot-plug handling or `stop`.  Every open carries
//! an attempt number; a completion whose attempt is no longer current (the
//! device was removed or the session stopped meanwhile) is closed on
//! arrival.

use std::future::pending;
use std::sync::{mpsc as std_mpsc, Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::status::StatusHandle;
use crate::infrastructure::midi::{
    DeviceEvent, DeviceInfo, MidiDevice, MidiPort, MidiService, TransportError,
};

/// Where the bound port is published for the sender thread.
pub type PortSlot = watch::Sender<Option<Arc<dyn MidiPort>>>;

/// Read side of [`PortSlot`].
pub type PortWatch = watch::Receiver<Option<Arc<dyn MidiPort>>>;

/// Lifecycle of the outbound connection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Uninitialized,
    /// The platform has no MIDI support.  Terminal.
    FeatureUnsupported,
    /// Waiting for a USB device to appear.
    Discovering,
    Opening(DeviceInfo),
    Connected(DeviceInfo),
    /// Stopped, or the service could not be reached.
    Disconnected,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected(_))
    }
}

/// Faults reported to the status listener.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("this device does not support MIDI")]
    FeatureUnsupported,

    #[error("unable to get MIDI service: {0}")]
    ServiceUnavailable(#[source] TransportError),

    #[error("cannot open MIDI device {device}: {source}")]
    DeviceOpenFailed {
        device: String,
        #[source]
        source: TransportError,
    },

    #[error("MIDI device {device} has no available input port")]
    NoInputPort { device: String },

    #[error("MIDI send error: {0}")]
    Transmit(#[source] TransportError),
}

enum Command {
    /// Release everything and exit; `done` fires once released.
    Stop { done: std_mpsc::Sender<()> },
}

struct OpenCompletion {
    attempt: u64,
    info: DeviceInfo,
    result: Result<Box<dyn MidiDevice>, TransportError>,
}

// ── Held resources ────────────────────────────────────────────────────────────

/// The device the context holds and the port it published from it.
struct Binding {
    device: Box<dyn MidiDevice>,
    port: Arc<dyn MidiPort>,
}

/// What the context owns, shared with its [`SessionHandle`] so that a stop
/// which times out can still release the port and device.
#[derive(Clone)]
struct Resources {
    port: Arc<PortSlot>,
    binding: Arc<Mutex<Option<Binding>>>,
    state: Arc<RwLock<ConnectionState>>,
}

impl Resources {
    fn binding(&self) -> MutexGuard<'_, Option<Binding>> {
        self.binding.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bind(&self, device: Box<dyn MidiDevice>, port: Arc<dyn MidiPort>) {
        let mut binding = self.binding();
        self.port.send_replace(Some(Arc::clone(&port)));
        *binding = Some(Binding { device, port });
    }

    fn is_bound(&self) -> bool {
        self.binding().is_some()
    }

    fn is_bound_to(&self, id: u32) -> bool {
        self.binding()
            .as_ref()
            .is_some_and(|b| b.device.info().id == id)
    }

    /// Withdraws the port from the sender, then closes port and device.
    /// Idempotent.
    fn release(&self) {
        let mut binding = self.binding();
        let Some(Binding { device, port }) = binding.take() else {
            return;
        };
        // Only clear the slot if it still holds this binding's port.
        self.port.send_if_modified(|current| {
            let ours = current.as_ref().is_some_and(|p| Arc::ptr_eq(p, &port));
            if ours {
                *current = None;
            }
            ours
        });
        drop(binding);

        port.close();
        device.close();
        info!("closed MIDI device {}", device.info());
    }

    fn set_state(&self, next: ConnectionState) {
        debug!("connection state -> {next:?}");
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = next;
    }
}

// ── Handle ────────────────────────────────────────────────────────────────────

/// Handle to a running connection context.
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
    resources: Resources,
}

impl SessionHandle {
    /// Whether the connection context has exited (stopped, unsupported, or
    /// no service).
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Asks the connection context to release the port and device, waiting
    /// at most `timeout`.  If it does not answer in time the task is aborted
    /// and the port and device are released from here; `false` is returned
    /// in that case.  Either way nothing is left bound afterwards.
    ///
    /// Blocks the calling thread; call it from outside the runtime's worker
    /// threads.
    pub fn stop(self, timeout: Duration) -> bool {
        let (done, released) = std_mpsc::channel();
        if self.commands.send(Command::Stop { done }).is_err() {
            // Already exited, and exiting releases.
            self.resources.release();
            return true;
        }
        match released.recv_timeout(timeout) {
            Ok(()) | Err(std_mpsc::RecvTimeoutError::Disconnected) => true,
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                warn!("connection context did not release within {timeout:?}; aborting it");
                self.task.abort();
                self.resources.release();
                self.resources.set_state(ConnectionState::Disconnected);
                false
            }
        }
    }
}

/// Spawns the connection context on `runtime`.
pub fn spawn_session(
    runtime: &Handle,
    service: Arc<dyn MidiService>,
    port: Arc<PortSlot>,
    state: Arc<RwLock<ConnectionState>>,
    status: StatusHandle,
) -> SessionHandle {
    let (commands, command_rx) = mpsc::unbounded_channel();
    let (completions, completion_rx) = mpsc::unbounded_channel();
    let resources = Resources {
        port,
        binding: Arc::new(Mutex::new(None)),
        state,
    };
    let session = Session {
        service,
        resources: resources.clone(),
        status,
        opening: None,
        attempts: 0,
        completions,
    };
    let task = runtime.spawn(session.run(command_rx, completion_rx));
    SessionHandle {
        commands,
        task,
        resources,
    }
}

// ── Connection context ────────────────────────────────────────────────────────

struct Session {
    service: Arc<dyn MidiService>,
    resources: Resources,
    status: StatusHandle,
    /// Attempt number and target of the open in flight.
    opening: Option<(u64, DeviceInfo)>,
    attempts: u64,
    completions: mpsc::UnboundedSender<OpenCompletion>,
}

/// An aborted or panicked context still gives its device back.
impl Drop for Session {
    fn drop(&mut self) {
        self.resources.release();
    }
}

impl Session {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut completions: mpsc::UnboundedReceiver<OpenCompletion>,
    ) {
        if !self.service.probe_feature_supported() {
            self.set_state(ConnectionState::FeatureUnsupported);
            self.report(SessionError::FeatureUnsupported);
            return;
        }

        let mut devices = match self.service.watch_devices() {
            Ok(rx) => Some(rx),
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                self.report(SessionError::ServiceUnavailable(e));
                return;
            }
        };

        self.set_state(ConnectionState::Discovering);
        match self.service.enumerate_devices().into_iter().find(DeviceInfo::is_usb) {
            Some(info) => self.begin_open(info),
            None => info!("no USB MIDI device attached; waiting for one"),
        }

        loop {
            tokio::select! {
                command = commands.recv() => {
                    self.release();
                    self.set_state(ConnectionState::Disconnected);
                    if let Some(Command::Stop { done }) = command {
                        let _ = done.send(());
                    }
                    break;
                }
                Some(event) = next_device_event(&mut devices) => self.on_device_event(event),
                Some(completion) = completions.recv() => self.on_open_complete(completion),
            }
        }
        info!("connection context stopped");
    }

    fn on_device_event(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::Added(info) => {
                info!("MIDI device attached: {info}");
                if !info.is_usb() {
                    debug!("ignoring non-USB device {info}");
                } else if self.resources.is_bound() || self.opening.is_some() {
                    debug!("already bound to a device; ignoring {info}");
                } else {
                    self.begin_open(info);
                }
            }
            DeviceEvent::Removed(info) => {
                info!("MIDI device detached: {info}");
                let opening = self.opening.as_ref().is_some_and(|(_, o)| o.id == info.id);
                if self.resources.is_bound_to(info.id) {
                    self.release();
                    self.set_state(ConnectionState::Discovering);
                    self.status.disconnected();
                } else if opening {
                    // The completion, when it comes, is stale and gets closed.
                    self.opening = None;
                    self.set_state(ConnectionState::Discovering);
                }
            }
        }
    }

    fn begin_open(&mut self, info: DeviceInfo) {
        self.attempts += 1;
        let attempt = self.attempts;
        info!("opening MIDI device {info}");
        self.opening = Some((attempt, info.clone()));
        self.set_state(ConnectionState::Opening(info.clone()));

        let service = Arc::clone(&self.service);
        let completions = self.completions.clone();
        tokio::spawn(async move {
            let result = service.open_device(&info).await;
            if let Err(mpsc::error::SendError(orphan)) = completions.send(OpenCompletion {
                attempt,
                info,
                result,
            }) {
                if let Ok(device) = orphan.result {
                    device.close();
                }
            }
        });
    }

    fn on_open_complete(&mut self, completion: OpenCompletion) {
        let OpenCompletion {
            attempt,
            info,
            result,
        } = completion;

        if !matches!(&self.opening, Some((current, _)) if *current == attempt) {
            debug!("discarding stale open of {info}");
            if let Ok(device) = result {
                device.close();
            }
            return;
        }
        self.opening = None;

        let name = info.display_name().to_string();
        let device = match result {
            Ok(device) => device,
            Err(source) => {
                self.set_state(ConnectionState::Discovering);
                self.report(SessionError::DeviceOpenFailed { device: name, source });
                return;
            }
        };

        // First input port that actually opens.
        let port = device
            .info()
            .input_ports
            .iter()
            .find_map(|&number| device.open_input_port(number));
        match port {
            Some(port) => {
                info!("MIDI input port bound on {info}");
                self.resources.bind(device, port);
                self.set_state(ConnectionState::Connected(info));
                self.status.connected(&name);
            }
            None => {
                device.close();
                self.set_state(ConnectionState::Discovering);
                self.report(SessionError::NoInputPort { device: name });
            }
        }
    }

    fn release(&mut self) {
        self.opening = None;
        self.resources.release();
    }

    fn set_state(&self, next: ConnectionState) {
        self.resources.set_state(next);
    }

    fn report(&self, error: SessionError) {
        warn!("{error}");
        self.status.error(error.to_string());
    }
}

/// Next hot-plug event; pends forever once the watcher has gone away.
async fn next_device_event(
    devices: &mut Option<mpsc::UnboundedReceiver<DeviceEvent>>,
) -> Option<DeviceEvent> {
    let Some(rx) = devices.as_mut() else {
        return pending().await;
    };
    let event = rx.recv().await;
    if event.is_none() {
        warn!("device watcher closed; hot-plug disabled");
        *devices = None;
    }
    event
}
