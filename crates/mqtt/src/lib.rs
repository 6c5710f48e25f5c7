//! # thermosim-mqtt: publish-only MQTT session
//!
//! A small async MQTT layer on top of `rumqttc` used by the thermosim sensor
//! simulator. It adds to the raw client:
//!
//! - **Validated configuration** loaded from TOML
//! - **Explicit handshake** that fails fast when the broker is unreachable or
//!   refuses the connection
//! - **State monitoring** over a watch channel
//! - **Graceful shutdown** that flushes DISCONNECT after pending publishes
//! - **Acknowledgement counting** for QoS 1/2 publishes
//!
//! # Quick Start
//!
//! ```ignore
//! use thermosim_mqtt::{Config, MqttManager};
//!
//! #[tokio::main]
//! async fn main() -> thermosim_mqtt::Result<()> {
//!     let session = MqttManager::from_config(Config::default())?.connect().await?;
//!
//!     session
//!         .publish("home/livingroom/temperature", 1, br#"{"temperature":21.5}"#.to_vec())
//!         .await?;
//!
//!     session.disconnect().await
//! }
//! ```
//!
//! # Connection Lifecycle
//!
//! ```text
//! Connecting ──CONNACK──> Connected ──error──> Disconnected ──> Reconnecting ──> Connecting
//!                             │
//!                             └──disconnect()──> Closed
//! ```
//!
//! A failure before the first CONNACK is returned from
//! [`MqttManager::connect`] and never retried. After that the connection
//! kernel re-dials on transient errors every `reconnect_delay` seconds while
//! publishes fail with [`TransferError::NotConnected`].

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod manager;
pub mod state;

pub use client::ClientBuilder;
pub use config::Config;
pub use connection::ConnectionKernel;
pub use error::TransferError;
pub use manager::{qos_from_u8, MqttManager, MqttSession};
pub use state::ConnectionState;

/// Result alias for session operations.
pub type Result<T> = std::result::Result<T, TransferError>;
