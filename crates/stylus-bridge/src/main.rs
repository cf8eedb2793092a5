//! StylusSync bridge: entry point.
//!
//! # Usage
//!
//! ```text
//! stylus-bridge [--config PATH] send
//! stylus-bridge [--config PATH] monitor --device /dev/snd/midiC1D0
//! ```
//!
//! `send` reads JSON-lines touch samples from stdin, translates them, and
//! forwards them to the first USB MIDI device that shows up.  `monitor` is
//! the receiving end: it decodes frames arriving on a raw MIDI node and
//! prints one line per frame.
//!
//! # Environment variable overrides
//!
//! | Variable        | Description                                   |
//! |-----------------|-----------------------------------------------|
//! | `STYLUS_CONFIG` | Config file path (default: platform dir)      |
//! | `RUST_LOG`      | Log filter; overrides `bridge.log_level`      |

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc, Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use stylus_core::protocol::MessageReader;
use stylus_core::{FrameAssembler, FrameKind, SampleTranslator};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use stylus_bridge::infrastructure::midi::MidiService;
use stylus_bridge::infrastructure::sample_source::{jsonl::JsonLinesSource, SampleSource};
use stylus_bridge::infrastructure::storage::config::{self, BridgeConfig};
use stylus_bridge::{BridgeOptions, StatusListener, StylusBridge};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Touch-to-MIDI bridge.
#[derive(Debug, Parser)]
#[command(name = "stylus-bridge", about = "Forwards touch input to a USB MIDI device", version)]
struct Cli {
    /// Config file to load instead of the platform default.
    #[arg(long, env = "STYLUS_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Read JSON-lines samples from stdin and send them.
    Send,
    /// Decode frames arriving on a raw MIDI device node.
    Monitor {
        #[arg(long)]
        device: PathBuf,
    },
}

// ── Status listener ───────────────────────────────────────────────────────────

/// Writes status notifications to the log.
struct LogListener;

impl StatusListener for LogListener {
    fn on_connected(&self, device_name: &str) {
        info!("connected to {device_name}");
    }

    fn on_disconnected(&self) {
        warn!("MIDI device disconnected; waiting for another");
    }

    fn on_error(&self, message: &str) {
        error!("{message}");
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => config::load_config_from(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => config::load_config().context("loading config")?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.bridge.log_level)),
        )
        .init();

    // Built by hand rather than with `#[tokio::main]`: the sample loop and
    // `StylusBridge::stop` block, so they stay on this thread.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("stylus-runtime")
        .build()
        .context("building tokio runtime")?;

    match cli.command {
        Command::Send => run_send(&runtime, &config),
        Command::Monitor { device } => run_monitor(&device),
    }
}

// ── send ──────────────────────────────────────────────────────────────────────

fn run_send(runtime: &tokio::runtime::Runtime, config: &BridgeConfig) -> anyhow::Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        runtime.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
                running.store(false, Ordering::SeqCst);
            }
        });
    }

    let service = midi_service(config)?;
    let options = BridgeOptions::from(&config.bridge);
    let bridge = StylusBridge::new(runtime.handle().clone(), service, options)
        .context("creating bridge")?;
    bridge.set_status_listener(Some(Arc::new(LogListener)));
    bridge.start().context("starting bridge")?;

    let source = JsonLinesSource::new(BufReader::new(io::stdin()));
    let samples = source.start().context("starting stdin reader")?;
    let mut translator = SampleTranslator::new(config.surface.size(), config.surface.stylus_only);
    info!(surface = ?translator.surface(), "reading samples from stdin");

    while running.load(Ordering::SeqCst) {
        match samples.recv_timeout(Duration::from_millis(100)) {
            Ok(sample) => {
                for event in translator.translate(&sample) {
                    bridge.enqueue(event);
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                info!("end of input");
                break;
            }
        }
    }

    source.stop();
    if source.rejected_lines() > 0 {
        warn!(rejected = source.rejected_lines(), "some input lines were not valid samples");
    }
    bridge.stop();
    Ok(())
}

#[cfg(target_os = "linux")]
fn midi_service(config: &BridgeConfig) -> anyhow::Result<Arc<dyn MidiService>> {
    use stylus_bridge::infrastructure::midi::rawmidi::RawMidiService;

    Ok(Arc::new(RawMidiService::new(
        &config.midi.device_dir,
        &config.midi.sysfs_dir,
        config.midi.poll_interval(),
    )))
}

#[cfg(not(target_os = "linux"))]
fn midi_service(_config: &BridgeConfig) -> anyhow::Result<Arc<dyn MidiService>> {
    anyhow::bail!("no MIDI backend is available on this platform")
}

// ── monitor ───────────────────────────────────────────────────────────────────

/// Runs until the node reports end of file; interrupt with Ctrl+C.
fn run_monitor(device: &std::path::Path) -> anyhow::Result<()> {
    let mut node = File::open(device).with_context(|| format!("opening {}", device.display()))?;
    let mut reader = MessageReader::new();
    let mut assembler = FrameAssembler::new();
    let mut buf = [0u8; 256];
    info!("monitoring {}", device.display());

    loop {
        let n = node
            .read(&mut buf)
            .with_context(|| format!("reading {}", device.display()))?;
        if n == 0 {
            break;
        }
        for frame in assembler.push_all(&reader.feed(&buf[..n])) {
            if let Some(gap) = frame.gap {
                warn!(expected = gap.expected, received = gap.received, "sequence gap");
            }
            match frame.kind {
                FrameKind::Motion => println!(
                    "#{:<3} motion  x={:<5} y={:<5} p={}",
                    frame.sequence, frame.x, frame.y, frame.pressure
                ),
                FrameKind::Button { button_id, down } => println!(
                    "#{:<3} button  x={:<5} y={:<5} p={} id={} {}",
                    frame.sequence,
                    frame.x,
                    frame.y,
                    frame.pressure,
                    button_id,
                    if down { "down" } else { "up" }
                ),
            }
        }
    }

    info!(
        truncated = assembler.truncated_frames(),
        rejected = assembler.rejected_messages(),
        "monitor finished"
    );
    Ok(())
}
