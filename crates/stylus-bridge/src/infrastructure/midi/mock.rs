//! Mock MIDI service for testing.
//!
//! Lets tests script the transport without any MIDI hardware: which devices
//! exist, whether the feature and service are available, which opens and
//! sends fail, and when devices come and go.  Every byte written through a
//! port is recorded.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use super::{
    DeviceEvent, DeviceInfo, MidiDevice, MidiPort, MidiService, TransportError, TransportKind,
};

#[derive(Default)]
struct MockState {
    devices: Vec<DeviceInfo>,
    watchers: Vec<mpsc::UnboundedSender<DeviceEvent>>,
    failing_opens: HashSet<u32>,
    refused_ports: HashSet<u32>,
    /// (device id, port number) pairs that refuse to open.
    refused_port_numbers: HashSet<(u32, u32)>,
    fail_sends: bool,
    writes: Vec<Vec<u8>>,
    opened: Vec<u32>,
    bound_ports: Vec<(u32, u32)>,
    devices_closed: u32,
    ports_closed: u32,
}

/// A scriptable in-memory implementation of [`MidiService`].
pub struct MockMidiService {
    state: Arc<Mutex<MockState>>,
    feature_supported: bool,
    service_available: bool,
    /// `false` while opens are held back by [`hold_opens`](Self::hold_opens).
    open_gate: watch::Sender<bool>,
}

impl MockMidiService {
    /// Creates a service with MIDI supported, the service reachable, and no
    /// devices attached.
    pub fn new() -> Self {
        let (open_gate, _) = watch::channel(true);
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            feature_supported: true,
            service_available: true,
            open_gate,
        }
    }

    /// Attaches `info` before the service is started.
    pub fn with_device(self, info: DeviceInfo) -> Self {
        self.lock().devices.push(info);
        self
    }

    pub fn with_feature_supported(mut self, supported: bool) -> Self {
        self.feature_supported = supported;
        self
    }

    pub fn with_service_available(mut self, available: bool) -> Self {
        self.service_available = available;
        self
    }

    /// Makes every future open of device `id` fail.
    pub fn fail_open(&self, id: u32) {
        self.lock().failing_opens.insert(id);
    }

    /// Makes device `id` refuse to open any input port.
    pub fn refuse_input_port(&self, id: u32) {
        self.lock().refused_ports.insert(id);
    }

    /// Makes input port `port_number` of device `id` refuse to open.
    pub fn refuse_port(&self, id: u32, port_number: u32) {
        self.lock().refused_port_numbers.insert((id, port_number));
    }

    /// Makes every port send fail (or succeed again).
    pub fn set_fail_sends(&self, fail: bool) {
        self.lock().fail_sends = fail;
    }

    /// Suspends open completions until [`release_opens`](Self::release_opens).
    pub fn hold_opens(&self) {
        self.open_gate.send_replace(false);
    }

    pub fn release_opens(&self) {
        self.open_gate.send_replace(true);
    }

    /// Attaches a device and notifies watchers.
    pub fn add_device(&self, info: DeviceInfo) {
        let mut state = self.lock();
        state.devices.push(info.clone());
        state
            .watchers
            .retain(|w| w.send(DeviceEvent::Added(info.clone())).is_ok());
    }

    /// Detaches device `id` and notifies watchers.  Unknown ids are ignored.
    pub fn remove_device(&self, id: u32) {
        let mut state = self.lock();
        let Some(pos) = state.devices.iter().position(|d| d.id == id) else {
            return;
        };
        let info = state.devices.remove(pos);
        state
            .watchers
            .retain(|w| w.send(DeviceEvent::Removed(info.clone())).is_ok());
    }

    /// Every message written through any port, in write order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.lock().writes.clone()
    }

    /// Ids of the devices opened so far, in completion order.
    pub fn opened_devices(&self) -> Vec<u32> {
        self.lock().opened.clone()
    }

    /// (device id, port number) of every input port opened so far.
    pub fn bound_ports(&self) -> Vec<(u32, u32)> {
        self.lock().bound_ports.clone()
    }

    pub fn device_close_count(&self) -> u32 {
        self.lock().devices_closed
    }

    pub fn port_close_count(&self) -> u32 {
        self.lock().ports_closed
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().expect("lock poisoned")
    }
}

impl Default for MockMidiService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MidiService for MockMidiService {
    fn probe_feature_supported(&self) -> bool {
        self.feature_supported
    }

    fn watch_devices(&self) -> Result<mpsc::UnboundedReceiver<DeviceEvent>, TransportError> {
        if !self.service_available {
            return Err(TransportError::ServiceUnavailable(
                "mock service disabled".to_string(),
            ));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().watchers.push(tx);
        Ok(rx)
    }

    fn enumerate_devices(&self) -> Vec<DeviceInfo> {
        self.lock().devices.clone()
    }

    async fn open_device(&self, info: &DeviceInfo) -> Result<Box<dyn MidiDevice>, TransportError> {
        let mut gate = self.open_gate.subscribe();
        // The sender lives as long as `self`, so this only fails if the
        // service is being torn down mid-open.
        if gate.wait_for(|open| *open).await.is_err() {
            return Err(TransportError::Closed);
        }

        let mut state = self.lock();
        if state.failing_opens.contains(&info.id) {
            return Err(TransportError::OpenFailed {
                device: info.display_name().to_string(),
                reason: "scripted failure".to_string(),
            });
        }
        state.opened.push(info.id);
        Ok(Box::new(MockDevice {
            info: info.clone(),
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockDevice {
    info: DeviceInfo,
    state: Arc<Mutex<MockState>>,
}

impl MidiDevice for MockDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn open_input_port(&self, port_number: u32) -> Option<Arc<dyn MidiPort>> {
        let mut state = self.state.lock().expect("lock poisoned");
        let refused = state.refused_ports.contains(&self.info.id)
            || state.refused_port_numbers.contains(&(self.info.id, port_number));
        if refused || !self.info.input_ports.contains(&port_number) {
            return None;
        }
        state.bound_ports.push((self.info.id, port_number));
        Some(Arc::new(MockPort {
            state: Arc::clone(&self.state),
            closed: Mutex::new(false),
        }))
    }

    fn close(&self) {
        self.state.lock().expect("lock poisoned").devices_closed += 1;
    }
}

struct MockPort {
    state: Arc<Mutex<MockState>>,
    closed: Mutex<bool>,
}

impl MidiPort for MockPort {
    fn send(&self, bytes: &[u8]) -> Result<(), TransportError> {
        if *self.closed.lock().expect("lock poisoned") {
            return Err(TransportError::Closed);
        }
        let mut state = self.state.lock().expect("lock poisoned");
        if state.fail_sends {
            return Err(TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "scripted send failure",
            )));
        }
        state.writes.push(bytes.to_vec());
        Ok(())
    }

    fn close(&self) {
        let mut closed = self.closed.lock().expect("lock poisoned");
        if !*closed {
            *closed = true;
            self.state.lock().expect("lock poisoned").ports_closed += 1;
        }
    }
}

/// Builds a [`DeviceInfo`] for tests: one input port numbered 0.
pub fn device(id: u32, name: &str, transport: TransportKind) -> DeviceInfo {
    DeviceInfo {
        id,
        name: Some(name.to_string()),
        product: None,
        transport,
        input_ports: vec![0],
    }
}
