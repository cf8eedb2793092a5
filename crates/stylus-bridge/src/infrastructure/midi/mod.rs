//! MIDI transport infrastructure.
//!
//! The bridge never touches a MIDI API directly.  It sees a [`MidiService`]
//! that can enumerate and open devices, a [`MidiDevice`] that hands out
//! writable ports, and a [`MidiPort`] that accepts raw bytes.
//!
//! # Port direction
//!
//! Port names follow the device's point of view: the bridge writes into the
//! device's *input* port.
//!
//! # Backends
//!
//! - [`mock::MockMidiService`] – scriptable in-memory transport for tests.
//! - [`rawmidi::RawMidiService`] – ALSA raw MIDI device nodes (Linux only).

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;

pub mod mock;

#[cfg(target_os = "linux")]
pub mod rawmidi;

/// Name reported for a device that carries neither a name nor a product.
pub const UNKNOWN_DEVICE_NAME: &str = "Unknown MIDI device";

/// How a device is attached to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Usb,
    Bluetooth,
    Virtual,
    Other,
}

/// Description of an enumerated device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Service-assigned identifier, stable while the device stays attached.
    pub id: u32,
    pub name: Option<String>,
    pub product: Option<String>,
    pub transport: TransportKind,
    /// Port numbers of the device's input ports, in service order.
    pub input_ports: Vec<u32>,
}

impl DeviceInfo {
    pub fn is_usb(&self) -> bool {
        self.transport == TransportKind::Usb
    }

    /// Name shown to the user: the device name, else the product, else a
    /// fixed placeholder.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.product.as_deref())
            .unwrap_or(UNKNOWN_DEVICE_NAME)
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (#{})", self.display_name(), self.id)
    }
}

/// Hot-plug notification from [`MidiService::watch_devices`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Added(DeviceInfo),
    Removed(DeviceInfo),
}

/// Error type for transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The platform MIDI service could not be reached.
    #[error("MIDI service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The service refused or failed to open a device.
    #[error("failed to open {device}: {reason}")]
    OpenFailed { device: String, reason: String },

    /// The port or device has already been closed.
    #[error("port is closed")]
    Closed,

    /// An OS-level I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A writable port on an open device.
///
/// `send` is called only from the sender thread; `close` only from the
/// connection context after the port has been withdrawn from the sender.
pub trait MidiPort: Send + Sync {
    /// Writes one complete message.
    fn send(&self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Releases the port.  Further sends fail with [`TransportError::Closed`].
    fn close(&self);
}

/// An open device.
pub trait MidiDevice: Send + Sync {
    fn info(&self) -> &DeviceInfo;

    /// Opens input port `port_number`, or `None` if the device refuses.
    fn open_input_port(&self, port_number: u32) -> Option<Arc<dyn MidiPort>>;

    /// Releases the device.
    fn close(&self);
}

/// The platform MIDI service.
#[async_trait]
pub trait MidiService: Send + Sync {
    /// Whether the platform supports MIDI at all.
    fn probe_feature_supported(&self) -> bool;

    /// Subscribes to hot-plug notifications.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ServiceUnavailable`] when the service cannot
    /// be reached.
    fn watch_devices(&self) -> Result<UnboundedReceiver<DeviceEvent>, TransportError>;

    /// Lists the devices currently attached.
    fn enumerate_devices(&self) -> Vec<DeviceInfo>;

    /// Opens a device.  Completes once the service has finished opening it.
    async fn open_device(&self, info: &DeviceInfo) -> Result<Box<dyn MidiDevice>, TransportError>;
}
