//! Transport seam between the publish cycles and the broker.
//!
//! The cycle runner and the driver only see [`Transport`]. The production
//! implementation, [`MqttTransport`], wraps a `thermosim_mqtt` session.

use async_trait::async_trait;
use thermosim_mqtt::{MqttManager, MqttSession, TransferError};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Result of handing one message to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// The message was not accepted; the string carries the reason.
    Failed(String),
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    /// The broker session could not be established.
    #[error("Failed to connect to broker: {0}")]
    Connect(#[from] TransferError),

    #[error("Transport is already connected")]
    AlreadyConnected,
}

/// Publishing side of a broker session.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Opens the session. Failure is final; callers do not retry.
    async fn connect(&self) -> Result<(), TransportError>;

    /// Hands one payload to the broker session.
    ///
    /// Delivery problems are reported in the outcome, never as an error.
    async fn publish(&self, channel: &str, payload: Vec<u8>, qos: u8) -> DeliveryOutcome;

    /// Closes the session. Safe to call more than once.
    async fn disconnect(&self);

    /// Publishes the broker has acknowledged so far.
    fn acknowledged(&self) -> u64 {
        0
    }
}

/// [`Transport`] backed by an MQTT broker session.
pub struct MqttTransport {
    config: thermosim_mqtt::Config,
    session: OnceCell<MqttSession>,
}

impl MqttTransport {
    pub fn new(config: thermosim_mqtt::Config) -> Self {
        Self {
            config,
            session: OnceCell::new(),
        }
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        if self.session.initialized() {
            return Err(TransportError::AlreadyConnected);
        }
        let session = MqttManager::from_config(self.config.clone())?
            .connect()
            .await?;
        self.session
            .set(session)
            .map_err(|_| TransportError::AlreadyConnected)
    }

    async fn publish(&self, channel: &str, payload: Vec<u8>, qos: u8) -> DeliveryOutcome {
        let Some(session) = self.session.get() else {
            return DeliveryOutcome::Failed("transport is not connected".into());
        };
        match session.publish(channel, qos, payload).await {
            Ok(()) => DeliveryOutcome::Delivered,
            Err(e) => DeliveryOutcome::Failed(e.to_string()),
        }
    }

    async fn disconnect(&self) {
        let Some(session) = self.session.get() else {
            debug!("Transport was never connected, nothing to release");
            return;
        };
        if let Err(e) = session.disconnect().await {
            warn!("Error while disconnecting from broker: {}", e);
        }
    }

    fn acknowledged(&self) -> u64 {
        self.session.get().map_or(0, MqttSession::acknowledged)
    }
}
