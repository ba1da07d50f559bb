//! Configuration types.
//!
//! All types implement [`Default`] for compile-time fallback values.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure after merging all layers.
///
/// # Example
///
/// ```
/// use rendezvous_runtime::config::RendezvousConfig;
///
/// let config = RendezvousConfig::default();
/// assert!(!config.debug);
/// assert_eq!(config.broker.send_timeout_ms, 30_000);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RendezvousConfig {
    /// Enable debug logging in binaries that honor it.
    pub debug: bool,

    /// Broker timing configuration.
    pub broker: BrokerConfig,
}

impl RendezvousConfig {
    /// Serializes to a TOML string.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Deserializes from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns error if the TOML is malformed or has wrong field types.
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Applies a higher-priority layer on top of this config.
    ///
    /// Every field the layer sets wins, including values equal to the
    /// defaults; fields the layer omits keep their current value.
    pub fn apply(&mut self, layer: &ConfigLayer) {
        if let Some(debug) = layer.debug {
            self.debug = debug;
        }
        self.broker.apply(&layer.broker);
    }
}

/// One config file as written: only the fields it mentions are `Some`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConfigLayer {
    pub debug: Option<bool>,
    pub broker: BrokerConfigLayer,
}

impl ConfigLayer {
    /// Parses one layer from TOML.
    ///
    /// # Errors
    ///
    /// Returns error if the TOML is malformed or has wrong field types.
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}

/// The `[broker]` table of a [`ConfigLayer`].
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BrokerConfigLayer {
    pub send_timeout_ms: Option<u64>,
    pub idle_timeout_ms: Option<u64>,
    pub sweep_interval_ms: Option<u64>,
}

/// Broker timing configuration.
///
/// ```toml
/// [broker]
/// send_timeout_ms = 30000   # 0 = wait forever
/// idle_timeout_ms = 0       # 0 = never evict idle channels
/// sweep_interval_ms = 1000
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BrokerConfig {
    /// Upper bound a producer waits for its response, in milliseconds.
    ///
    /// `0` disables the bound.
    pub send_timeout_ms: u64,

    /// Idle time after which a request channel is evicted, in milliseconds.
    ///
    /// `0` disables eviction.
    pub idle_timeout_ms: u64,

    /// Period of the idle sweeper, in milliseconds.
    pub sweep_interval_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            send_timeout_ms: 30_000,
            idle_timeout_ms: 0,
            sweep_interval_ms: 1_000,
        }
    }
}

impl BrokerConfig {
    /// Returns the producer wait bound, `None` when unbounded.
    #[must_use]
    pub fn send_timeout(&self) -> Option<Duration> {
        non_zero_millis(self.send_timeout_ms)
    }

    /// Returns the idle eviction threshold, `None` when disabled.
    #[must_use]
    pub fn idle_timeout(&self) -> Option<Duration> {
        non_zero_millis(self.idle_timeout_ms)
    }

    /// Returns the sweeper period (at least one millisecond).
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }

    fn apply(&mut self, layer: &BrokerConfigLayer) {
        let fields = [
            (&mut self.send_timeout_ms, layer.send_timeout_ms),
            (&mut self.idle_timeout_ms, layer.idle_timeout_ms),
            (&mut self.sweep_interval_ms, layer.sweep_interval_ms),
        ];
        for (field, value) in fields {
            if let Some(value) = value {
                *field = value;
            }
        }
    }
}

fn non_zero_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}
