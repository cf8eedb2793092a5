//! Shared fixtures for the bridge integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use stylus_bridge::infrastructure::midi::mock::MockMidiService;
use stylus_bridge::{BridgeOptions, StatusEvent, StatusListener, StylusBridge};
use tokio::runtime::Handle;

pub const WAIT: Duration = Duration::from_secs(5);

/// Listener that keeps every notification it receives.
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<StatusEvent>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<StatusEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                StatusEvent::Error(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, event: &StatusEvent) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }
}

impl StatusListener for Recorder {
    fn on_connected(&self, device_name: &str) {
        self.events
            .lock()
            .unwrap()
            .push(StatusEvent::Connected(device_name.to_string()));
    }

    fn on_disconnected(&self) {
        self.events.lock().unwrap().push(StatusEvent::Disconnected);
    }

    fn on_error(&self, message: &str) {
        self.events
            .lock()
            .unwrap()
            .push(StatusEvent::Error(message.to_string()));
    }
}

/// A bridge over `service` with a recorder attached.  Must be called from
/// inside a multi-thread tokio runtime.
pub fn bridge(service: &Arc<MockMidiService>) -> (StylusBridge, Arc<Recorder>) {
    bridge_with(service, BridgeOptions::default())
}

/// [`bridge`] with explicit options.
pub fn bridge_with(
    service: &Arc<MockMidiService>,
    options: BridgeOptions,
) -> (StylusBridge, Arc<Recorder>) {
    let bridge = StylusBridge::new(Handle::current(), service.clone(), options).expect("bridge");
    let recorder = Arc::new(Recorder::default());
    bridge.set_status_listener(Some(recorder.clone()));
    (bridge, recorder)
}

/// Polls `cond` until it holds, failing the test after [`WAIT`].
pub async fn eventually(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Gives the notifier thread time to deliver anything still in flight.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}
