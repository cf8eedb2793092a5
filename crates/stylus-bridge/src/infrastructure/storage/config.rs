//! TOML-based configuration for the bridge.
//!
//! Reads `BridgeConfig` from the platform-appropriate config file unless a
//! path is given explicitly:
//! - Windows:  `%APPDATA%\StylusSync\config.toml`
//! - Linux:    `~/.config/stylussync/config.toml`
//! - macOS:    `~/Library/Application Support/StylusSync/config.toml`
//!
//! ```toml
//! [bridge]
//! log_level = "info"
//! stop_timeout_ms = 1000
//! backlog_warn_threshold = 4096
//!
//! [surface]
//! width = 1920
//! height = 1080
//! stylus_only = false
//!
//! [midi]
//! device_dir = "/dev/snd"
//! sysfs_dir = "/sys/class/sound"
//! poll_interval_ms = 1000
//! ```
//!
//! Every field has a serde default, so a missing file, a missing section,
//! and a missing key all fall back to the values above.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stylus_core::SurfaceSize;
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    #[serde(default)]
    pub bridge: BridgeSection,
    #[serde(default)]
    pub surface: SurfaceSection,
    #[serde(default)]
    pub midi: MidiSection,
}

/// Pipeline behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeSection {
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// How long `stop` waits for the sender thread and the connection context.
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
    /// Queue length step at which a backlog warning is logged.  0 disables it.
    #[serde(default = "default_backlog_warn_threshold")]
    pub backlog_warn_threshold: usize,
}

/// Input surface geometry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SurfaceSection {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    /// Drop samples from fingers, mice, and erasers.
    #[serde(default)]
    pub stylus_only: bool,
}

/// Raw MIDI backend locations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MidiSection {
    #[serde(default = "default_device_dir")]
    pub device_dir: PathBuf,
    #[serde(default = "default_sysfs_dir")]
    pub sysfs_dir: PathBuf,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl BridgeSection {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

impl SurfaceSection {
    pub fn size(&self) -> SurfaceSize {
        SurfaceSize {
            width: self.width,
            height: self.height,
        }
    }
}

impl MidiSection {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_stop_timeout_ms() -> u64 {
    1000
}
fn default_backlog_warn_threshold() -> usize {
    4096
}
fn default_width() -> u32 {
    1920
}
fn default_height() -> u32 {
    1080
}
fn default_device_dir() -> PathBuf {
    PathBuf::from("/dev/snd")
}
fn default_sysfs_dir() -> PathBuf {
    PathBuf::from("/sys/class/sound")
}
fn default_poll_interval_ms() -> u64 {
    1000
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            stop_timeout_ms: default_stop_timeout_ms(),
            backlog_warn_threshold: default_backlog_warn_threshold(),
        }
    }
}

impl Default for SurfaceSection {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            stylus_only: false,
        }
    }
}

impl Default for MidiSection {
    fn default() -> Self {
        Self {
            device_dir: default_device_dir(),
            sysfs_dir: default_sysfs_dir(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the default config file.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads the config from the platform location, falling back to defaults
/// when the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config() -> Result<BridgeConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads the config from `path`, falling back to defaults when the file does
/// not exist.
pub fn load_config_from(path: &Path) -> Result<BridgeConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BridgeConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config_to(config: &BridgeConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config base directory with the `StylusSync` suffix.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("StylusSync"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("stylussync"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("StylusSync")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
