//! Rendezvous Runtime - in-process request/response broker.
//!
//! Producers make synchronous-style calls into a stream of events keyed by
//! a request id; consumers attached to that request id compute the
//! responses in arrival order.
//!
//! # Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  rendezvous-types : RequestId, CallId, BrokerId, ErrorCode  │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Runtime Layer (THIS CRATE)                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  broker/ : Broker, RequestChannel, EventHandler, sweeper    │
//! │  config/ : RendezvousConfig, BrokerConfig, ConfigLoader     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! ## [`broker`] - Rendezvous Broker
//!
//! - [`Broker`](broker::Broker): `send` / `consume` / `close` / `shutdown`
//! - [`EventHandler`](broker::EventHandler): consumer-side event mapping
//! - [`ChannelStats`](broker::ChannelStats): per-request counters
//!
//! Guarantees per request id:
//!
//! 1. Events are handled in the order their `send` calls enqueued them.
//! 2. Every enqueued event is handled at most once.
//! 3. Each response reaches exactly the `send` call that produced the event.
//!
//! ## [`config`] - Configuration Management
//!
//! - [`RendezvousConfig`](config::RendezvousConfig): unified configuration type
//! - [`ConfigLoader`](config::ConfigLoader): multi-source config loader
//!
//! Configuration priority: Environment > Project > Global > Default

pub mod broker;
pub mod config;

// Re-exports for convenience
pub use broker::{Broker, BrokerError, ChannelStats, EventHandler, HandlerError};
pub use config::{
    default_config_dir, default_config_path, save_global_config, BrokerConfig, ConfigError,
    ConfigLoader, RendezvousConfig,
};

pub use rendezvous_types::{BrokerId, CallId, ErrorCode, RequestId};
