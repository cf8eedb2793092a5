//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the TOML configuration from the
//! platform-appropriate directory (or an explicit path) and supplies
//! defaults when the file or any key is missing.

pub mod config;
