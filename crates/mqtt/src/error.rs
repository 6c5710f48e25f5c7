//! Error handling for the MQTT session.
//!
//! `TransferError` aggregates every failure the session can report: setup
//! problems caught before any network traffic, connection failures during the
//! initial handshake, and per-publish rejections once the session is up.
//!
//! # Error Categories
//!
//! **Setup** (caught before connecting):
//! - `ConfigError`: validation failures in `Config`
//! - `ClientSetup`: the client could not be assembled
//! - `InvalidMetadata`: bad QoS level or topic on a publish
//!
//! **Connection** (fatal for a run, never retried by the caller):
//! - `ClientConnection`: network-level error from the event loop
//! - `ConnectionRefused`: the broker answered CONNACK with a refusal code
//! - `ConnectTimeout`: no CONNACK within the configured timeout
//!
//! **Delivery** (per message, non-fatal):
//! - `NotConnected`: publish attempted while the session is down
//! - `ClientTransfer`: the request queue rejected the publish
//! - `PublishTimeout`: the request queue stayed full past the timeout

use std::time::Duration;

use thiserror::Error;

/// The unified error type for MQTT session operations.
#[derive(Debug, Error)]
pub enum TransferError {
    /// QoS level or topic of a publish is not usable.
    ///
    /// Topics must be non-empty and must not contain the `+`/`#` wildcards;
    /// QoS must be 0, 1 or 2.
    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    /// The MQTT client could not be assembled from the configuration.
    #[error("Client setup error: {0}")]
    ClientSetup(String),

    /// Configuration validation failed.
    ///
    /// The `Config` struct carries `validator` rules for host length, port,
    /// keep-alive range and credential pairing.
    #[error("Configuration error: {0}")]
    ConfigError(#[from] validator::ValidationErrors),

    /// The local client could not queue a request (event loop gone).
    #[error("Client transfer error: {0}")]
    ClientTransfer(#[from] rumqttc::ClientError),

    /// Network-level connection error from the event loop.
    ///
    /// Boxed to keep the enum small.
    #[error("Client connection error: {0}")]
    ClientConnection(#[from] Box<rumqttc::ConnectionError>),

    /// The broker refused the CONNECT packet.
    #[error("Connection refused by broker: {0}")]
    ConnectionRefused(String),

    /// The broker did not acknowledge the CONNECT packet in time.
    #[error("No CONNACK received within {0:?}")]
    ConnectTimeout(Duration),

    /// A publish was attempted while the session is not connected.
    #[error("Session is not connected (state: {0})")]
    NotConnected(String),

    /// The publish request was not accepted by the client queue in time.
    #[error("Publish was not accepted within {0:?}")]
    PublishTimeout(Duration),

    /// The background connection task failed or panicked.
    #[error("Connection kernel error: {0}")]
    ConnectionKernel(String),
}

impl From<rumqttc::ConnectionError> for TransferError {
    fn from(err: rumqttc::ConnectionError) -> Self {
        TransferError::ClientConnection(Box::new(err))
    }
}
