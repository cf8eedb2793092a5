//! ALSA raw MIDI backend (Linux).
//!
//! Devices are the `midiC<card>D<device>` character nodes under
//! `/dev/snd`.  Each node is one bidirectional port; the bridge opens it
//! write-only and writes one message per `write_all`, so the kernel never
//! sees a partial message from us.
//!
//! # Classification
//!
//! A node is USB-attached when its sysfs `device` link resolves into the USB
//! tree (`/sys/class/sound/midiC1D0/device -> ../../../1-1:1.1`, which
//! canonicalises under `/sys/devices/.../usb1/...`).  The user-visible name
//! comes from the card id in `/proc/asound/card<N>/id`.
//!
//! # Hot-plug
//!
//! ALSA has no portable change notification for raw nodes, so a watcher
//! thread rescans the device directory every `poll_interval` and diffs the
//! result against the previous scan.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{
    DeviceEvent, DeviceInfo, MidiDevice, MidiPort, MidiService, TransportError, TransportKind,
};

/// Default location of the per-card ALSA metadata.
pub const DEFAULT_CARD_DIR: &str = "/proc/asound";

/// Device numbers per card; keeps ids unique across cards.
const DEVICES_PER_CARD: u32 = 32;

/// [`MidiService`] over ALSA raw MIDI device nodes.
#[derive(Debug, Clone)]
pub struct RawMidiService {
    device_dir: PathBuf,
    sysfs_dir: PathBuf,
    card_dir: PathBuf,
    poll_interval: Duration,
}

impl RawMidiService {
    pub fn new(
        device_dir: impl Into<PathBuf>,
        sysfs_dir: impl Into<PathBuf>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            device_dir: device_dir.into(),
            sysfs_dir: sysfs_dir.into(),
            card_dir: PathBuf::from(DEFAULT_CARD_DIR),
            poll_interval,
        }
    }

    /// Overrides where card names are read from.
    pub fn with_card_dir(mut self, card_dir: impl Into<PathBuf>) -> Self {
        self.card_dir = card_dir.into();
        self
    }

    fn scan(&self) -> BTreeMap<u32, DeviceInfo> {
        scan_devices(&self.device_dir, &self.sysfs_dir, &self.card_dir)
    }
}

#[async_trait]
impl MidiService for RawMidiService {
    fn probe_feature_supported(&self) -> bool {
        self.device_dir.is_dir()
    }

    fn watch_devices(&self) -> Result<mpsc::UnboundedReceiver<DeviceEvent>, TransportError> {
        if !self.device_dir.is_dir() {
            return Err(TransportError::ServiceUnavailable(format!(
                "{} is not a directory",
                self.device_dir.display()
            )));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let service = self.clone();
        let mut known = service.scan();

        thread::Builder::new()
            .name("stylus-hotplug".to_string())
            .spawn(move || {
                debug!("hot-plug watcher polling every {:?}", service.poll_interval);
                while !tx.is_closed() {
                    thread::sleep(service.poll_interval);
                    let current = service.scan();
                    for event in diff_scans(&known, &current) {
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    known = current;
                }
                debug!("hot-plug watcher exiting");
            })
            .map_err(TransportError::Io)?;

        Ok(rx)
    }

    fn enumerate_devices(&self) -> Vec<DeviceInfo> {
        self.scan().into_values().collect()
    }

    async fn open_device(&self, info: &DeviceInfo) -> Result<Box<dyn MidiDevice>, TransportError> {
        let (card, device) = split_id(info.id);
        let path = self.device_dir.join(node_name(card, device));
        let open_path = path.clone();

        let open = move || OpenOptions::new().write(true).open(open_path);
        let file = tokio::task::spawn_blocking(open)
            .await
            .map_err(|e| TransportError::OpenFailed {
                device: info.display_name().to_string(),
                reason: e.to_string(),
            })?
            .map_err(|e| TransportError::OpenFailed {
                device: info.display_name().to_string(),
                reason: format!("{}: {e}", path.display()),
            })?;

        info!("opened raw MIDI node {}", path.display());
        Ok(Box::new(RawMidiDevice {
            info: info.clone(),
            file: Mutex::new(Some(file)),
        }))
    }
}

// ── Device and port ───────────────────────────────────────────────────────────

struct RawMidiDevice {
    info: DeviceInfo,
    file: Mutex<Option<File>>,
}

impl MidiDevice for RawMidiDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn open_input_port(&self, port_number: u32) -> Option<Arc<dyn MidiPort>> {
        if port_number != 0 {
            return None;
        }
        let guard = self.file.lock().ok()?;
        let file = guard.as_ref()?;
        match file.try_clone() {
            Ok(clone) => Some(Arc::new(RawMidiPort {
                file: Mutex::new(Some(clone)),
            })),
            Err(e) => {
                warn!("could not duplicate handle for {}: {e}", self.info);
                None
            }
        }
    }

    fn close(&self) {
        if let Ok(mut file) = self.file.lock() {
            file.take();
        }
    }
}

struct RawMidiPort {
    file: Mutex<Option<File>>,
}

impl MidiPort for RawMidiPort {
    fn send(&self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut guard = self.file.lock().map_err(|_| TransportError::Closed)?;
        let file = guard.as_mut().ok_or(TransportError::Closed)?;
        file.write_all(bytes)?;
        Ok(())
    }

    fn close(&self) {
        if let Ok(mut file) = self.file.lock() {
            file.take();
        }
    }
}

// ── Scanning ──────────────────────────────────────────────────────────────────

fn scan_devices(device_dir: &Path, sysfs_dir: &Path, card_dir: &Path) -> BTreeMap<u32, DeviceInfo> {
    let mut devices = BTreeMap::new();
    let entries = match std::fs::read_dir(device_dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("cannot read {}: {e}", device_dir.display());
            return devices;
        }
    };

    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let Some(node) = file_name.to_str() else {
            continue;
        };
        let Some((card, device)) = parse_node_name(node) else {
            continue;
        };
        let id = card * DEVICES_PER_CARD + device;
        devices.insert(
            id,
            DeviceInfo {
                id,
                name: read_card_name(card_dir, card),
                product: None,
                transport: classify_transport(sysfs_dir, node),
                input_ports: vec![0],
            },
        );
    }
    devices
}

fn diff_scans(
    old: &BTreeMap<u32, DeviceInfo>,
    new: &BTreeMap<u32, DeviceInfo>,
) -> Vec<DeviceEvent> {
    let removed = old
        .iter()
        .filter(|(id, _)| !new.contains_key(id))
        .map(|(_, info)| DeviceEvent::Removed(info.clone()));
    let added = new
        .iter()
        .filter(|(id, _)| !old.contains_key(id))
        .map(|(_, info)| DeviceEvent::Added(info.clone()));
    removed.chain(added).collect()
}

/// Parses `midiC<card>D<device>`.
fn parse_node_name(name: &str) -> Option<(u32, u32)> {
    let rest = name.strip_prefix("midiC")?;
    let (card, device) = rest.split_once('D')?;
    let device: u32 = device.parse().ok()?;
    if device >= DEVICES_PER_CARD {
        return None;
    }
    Some((card.parse().ok()?, device))
}

fn node_name(card: u32, device: u32) -> String {
    format!("midiC{card}D{device}")
}

fn split_id(id: u32) -> (u32, u32) {
    (id / DEVICES_PER_CARD, id % DEVICES_PER_CARD)
}

fn read_card_name(card_dir: &Path, card: u32) -> Option<String> {
    let raw = std::fs::read_to_string(card_dir.join(format!("card{card}")).join("id")).ok()?;
    let name = raw.trim();
    (!name.is_empty()).then(|| name.to_string())
}

fn classify_transport(sysfs_dir: &Path, node: &str) -> TransportKind {
    let under_usb = |path: &Path| {
        path.components()
            .any(|c| c.as_os_str().to_string_lossy().starts_with("usb"))
    };
    match std::fs::canonicalize(sysfs_dir.join(node).join("device")) {
        Ok(path) if under_usb(&path) => TransportKind::Usb,
        Ok(_) => TransportKind::Other,
        Err(_) => TransportKind::Virtual,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    /// A throwaway directory tree mimicking `/dev/snd`, sysfs, and procfs.
    struct FakeAlsa {
        root: PathBuf,
    }

    impl FakeAlsa {
        fn new(test: &str) -> Self {
            let root = std::env::temp_dir()
                .join(format!("stylus_rawmidi_{}_{test}", std::process::id()));
            std::fs::remove_dir_all(&root).ok();
            let dirs = [
                "dev",
                "sys",
                "proc",
                "devices/pci0000:00/usb1/1-1",
                "devices/platform/snd",
            ];
            for dir in dirs {
                std::fs::create_dir_all(root.join(dir)).unwrap();
            }
            Self { root }
        }

        fn add_node(&self, card: u32, device: u32, name: &str, usb: bool) {
            let node = node_name(card, device);

            let card_dir = self.root.join("proc").join(format!("card{card}"));
            std::fs::create_dir_all(&card_dir).unwrap();
            std::fs::write(card_dir.join("id"), format!("{name}\n")).unwrap();

            let sys_node = self.root.join("sys").join(&node);
            std::fs::create_dir_all(&sys_node).unwrap();
            let target = if usb {
                self.root.join("devices/pci0000:00/usb1/1-1")
            } else {
                self.root.join("devices/platform/snd")
            };
            std::os::unix::fs::symlink(target, sys_node.join("device")).unwrap();

            // Node last, so a concurrent scan never sees a half-described device.
            std::fs::write(self.root.join("dev").join(&node), b"").unwrap();
        }

        fn service(&self) -> RawMidiService {
            RawMidiService::new(
                self.root.join("dev"),
                self.root.join("sys"),
                Duration::from_millis(10),
            )
                .with_card_dir(self.root.join("proc"))
        }
    }

    impl Drop for FakeAlsa {
        fn drop(&mut self) {
            std::fs::remove_dir_all(&self.root).ok();
        }
    }

    #[test]
    fn test_parse_node_name() {
        assert_eq!(parse_node_name("midiC1D0"), Some((1, 0)));
        assert_eq!(parse_node_name("midiC12D3"), Some((12, 3)));
        assert_eq!(parse_node_name("pcmC0D0p"), None);
        assert_eq!(parse_node_name("midiC1"), None);
        assert_eq!(parse_node_name("midiC1D99"), None);
    }

    #[test]
    fn test_ids_round_trip_through_node_names() {
        let id = 3 * DEVICES_PER_CARD + 2;
        assert_eq!(split_id(id), (3, 2));
        assert_eq!(node_name(3, 2), "midiC3D2");
    }

    #[test]
    fn test_enumerate_classifies_usb_and_reads_names() {
        // Arrange
        let alsa = FakeAlsa::new("enumerate");
        alsa.add_node(0, 0, "Internal", false);
        alsa.add_node(1, 0, "Tablet", true);

        // Act
        let devices = alsa.service().enumerate_devices();

        // Assert
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].transport, TransportKind::Other);
        assert_eq!(devices[1].transport, TransportKind::Usb);
        assert_eq!(devices[1].display_name(), "Tablet");
        assert_eq!(devices[1].id, DEVICES_PER_CARD);
    }

    #[test]
    fn test_missing_device_dir_is_unsupported() {
        let service = RawMidiService::new(
            "/nonexistent/stylus/dev",
            "/nonexistent",
            Duration::from_secs(1),
        );
        assert!(!service.probe_feature_supported());
        assert!(matches!(
            service.watch_devices(),
            Err(TransportError::ServiceUnavailable(_))
        ));
        assert!(service.enumerate_devices().is_empty());
    }

    #[test]
    fn test_diff_reports_removed_then_added() {
        let mut old = BTreeMap::new();
        let mut new = BTreeMap::new();
        let info = |id| DeviceInfo {
            id,
            name: None,
            product: None,
            transport: TransportKind::Usb,
            input_ports: vec![0],
        };
        old.insert(1, info(1));
        old.insert(2, info(2));
        new.insert(2, info(2));
        new.insert(3, info(3));

        let events = diff_scans(&old, &new);

        assert_eq!(events, vec![DeviceEvent::Removed(info(1)), DeviceEvent::Added(info(3))]);
    }

    #[tokio::test]
    async fn test_port_writes_reach_the_node() {
        // Arrange
        let alsa = FakeAlsa::new("write");
        alsa.add_node(2, 1, "Tablet", true);
        let service = alsa.service();
        let info = service.enumerate_devices().remove(0);

        // Act
        let device = service.open_device(&info).await.expect("open should succeed");
        let port = device.open_input_port(0).expect("port 0 exists");
        port.send(&[0xB1, 20, 0]).expect("send");
        port.send(&[0xB1, 30, 127]).expect("send");
        port.close();
        device.close();

        // Assert
        let mut written = Vec::new();
        File::open(alsa.root.join("dev/midiC2D1"))
            .unwrap()
            .read_to_end(&mut written)
            .unwrap();
        assert_eq!(written, vec![0xB1, 20, 0, 0xB1, 30, 127]);
        assert!(matches!(port.send(&[0xB0, 0, 0]), Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_hotplug_watcher_reports_new_node() {
        // Arrange
        let alsa = FakeAlsa::new("hotplug");
        let service = alsa.service();
        let mut rx = service.watch_devices().expect("dir exists");

        // Act
        alsa.add_node(4, 0, "Late", true);
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;

        // Assert
        match event {
            Ok(Some(DeviceEvent::Added(info))) => assert_eq!(info.display_name(), "Late"),
            other => panic!("expected an Added event, got {other:?}"),
        }
    }
}
