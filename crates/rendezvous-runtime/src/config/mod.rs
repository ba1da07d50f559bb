//! Broker configuration, loaded in layers.
//!
//! # Architecture
//!
//! ```text
//! Highest priority first:
//!
//! ┌──────────────────────────────────────────────┐
//! │  1. Environment Variables (RENDEZVOUS_*)     │  Runtime override
//! ├──────────────────────────────────────────────┤
//! │  2. Project Config (.rendezvous/config.toml) │  Project-specific
//! ├──────────────────────────────────────────────┤
//! │  3. Global Config (~/.rendezvous/config.toml)│  User defaults
//! ├──────────────────────────────────────────────┤
//! │  4. Default Values (compile-time)            │  Fallback
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Overrides
//!
//! | Variable | Field | Parsed as |
//! |----------|-------|-----------|
//! | `RENDEZVOUS_DEBUG` | `debug` | bool |
//! | `RENDEZVOUS_SEND_TIMEOUT_MS` | `broker.send_timeout_ms` | u64 |
//! | `RENDEZVOUS_IDLE_TIMEOUT_MS` | `broker.idle_timeout_ms` | u64 |
//! | `RENDEZVOUS_SWEEP_INTERVAL_MS` | `broker.sweep_interval_ms` | u64 |
//!
//! # File format
//!
//! ```toml
//! debug = false
//!
//! [broker]
//! send_timeout_ms = 30000
//! idle_timeout_ms = 600000
//! sweep_interval_ms = 1000
//! ```

mod error;
mod loader;
mod types;

pub use error::ConfigError;
pub use loader::{save_config, save_global_config, ConfigLoader};
pub use types::{BrokerConfig, BrokerConfigLayer, ConfigLayer, RendezvousConfig};

use std::path::PathBuf;

/// Directory holding a project's config file, relative to its root.
pub const PROJECT_CONFIG_DIR: &str = ".rendezvous";

/// File name shared by the global and project layers.
pub const PROJECT_CONFIG_FILE: &str = "config.toml";

/// `~/.rendezvous`, or `./.rendezvous` when no home directory is known.
pub fn default_config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(PROJECT_CONFIG_DIR)
}

/// `~/.rendezvous/config.toml`.
pub fn default_config_path() -> PathBuf {
    default_config_dir().join(PROJECT_CONFIG_FILE)
}
