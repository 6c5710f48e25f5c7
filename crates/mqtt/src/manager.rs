//! MQTT Manager Module
//! High-level entry point that assembles a publish-only session.
//!
//! The `MqttManager` holds a validated configuration. Calling
//! [`connect`](MqttManager::connect):
//! 1. Builds the client and its event loop
//! 2. Performs the CONNECT/CONNACK handshake within `connection_timeout`
//! 3. Spawns the connection kernel that keeps the event loop polled
//! 4. Returns an `MqttSession` for publishing
//!
//! # Typical Usage
//!
//! ```ignore
//! let session = MqttManager::new("localhost", 1883)?.connect().await?;
//! session.publish("home/livingroom/temperature", 1, payload).await?;
//! session.disconnect().await?;
//! ```

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use rumqttc::{AsyncClient, QoS};
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use validator::Validate;

use super::{
    client::ClientBuilder, config::Config, connection::ConnectionKernel, error::TransferError,
    state::ConnectionState,
};

/// Entry point for building an MQTT session.
pub struct MqttManager {
    /// Configuration for the MQTT connection
    config: Config,
}

impl MqttManager {
    /// Creates a manager from an existing configuration struct.
    ///
    /// # Returns
    /// - `Ok(Self)`: Manager ready to connect
    /// - `Err(TransferError::ConfigError)`: If the configuration is invalid
    pub fn from_config(config: Config) -> Result<Self, TransferError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Creates a manager with minimal configuration.
    ///
    /// All settings except the endpoint use defaults.
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, TransferError> {
        let config = Config {
            host: host.into(),
            port,
            ..Default::default()
        };
        Self::from_config(config)
    }

    /// Gets a reference to the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Opens the broker session.
    ///
    /// Returns once CONNACK has been accepted. From then on the connection
    /// kernel runs in a background task until [`MqttSession::disconnect`].
    ///
    /// # Errors
    /// - `TransferError::ClientConnection`: broker unreachable
    /// - `TransferError::ConnectionRefused`: CONNACK carried a refusal code
    /// - `TransferError::ConnectTimeout`: no CONNACK within `connection_timeout`
    pub async fn connect(self) -> Result<MqttSession, TransferError> {
        let builder = ClientBuilder::from_config(&self.config)?;
        let client_id = builder.client_id();
        let (client, event_loop) = builder.build()?;

        info!(
            "Connecting to MQTT broker at {} as '{}'",
            self.config.endpoint(),
            client_id
        );

        let cancel = CancellationToken::new();
        let mut kernel = ConnectionKernel::new(
            client.clone(),
            event_loop,
            cancel.clone(),
            self.config.reconnect_delay(),
        );
        let state_rx = kernel.subscribe_state();
        let acknowledged = kernel.acknowledged();

        kernel.establish(self.config.connection_timeout()).await?;

        let handle = tokio::spawn(async move {
            let result = kernel.run().await;
            if let Err(e) = &result {
                error!("MQTT connection kernel exited with error: {}", e);
            }
            result
        });

        Ok(MqttSession {
            client,
            state_rx,
            acknowledged,
            cancel,
            kernel: Mutex::new(Some(handle)),
            publish_timeout: self.config.publish_timeout(),
        })
    }
}

/// An established broker session.
///
/// Publishes are queued on the rumqttc client and written by the connection
/// kernel. Dropping the session without calling `disconnect` cancels the
/// kernel, which still tries to send DISCONNECT.
pub struct MqttSession {
    client: AsyncClient,
    state_rx: watch::Receiver<ConnectionState>,
    acknowledged: Arc<AtomicU64>,
    cancel: CancellationToken,
    kernel: Mutex<Option<JoinHandle<Result<(), TransferError>>>>,
    publish_timeout: Duration,
}

impl MqttSession {
    /// Queues one message for delivery.
    ///
    /// Succeeds when the client accepted the message into its request queue.
    /// For QoS 1/2 the broker acknowledgement arrives later and is counted by
    /// [`acknowledged`](Self::acknowledged).
    ///
    /// # Errors
    /// - `TransferError::InvalidMetadata`: bad QoS or topic
    /// - `TransferError::NotConnected`: session is down
    /// - `TransferError::PublishTimeout`: queue stayed full past `publish_timeout`
    /// - `TransferError::ClientTransfer`: the event loop is gone
    pub async fn publish(
        &self,
        topic: &str,
        qos: u8,
        payload: Vec<u8>,
    ) -> Result<(), TransferError> {
        let qos = qos_from_u8(qos)?;
        validate_topic(topic)?;

        let state = self.state();
        if !state.is_connected() {
            return Err(TransferError::NotConnected(state.to_string()));
        }

        debug!("Publishing {} bytes to '{}' ({:?})", payload.len(), topic, qos);
        tokio::time::timeout(
            self.publish_timeout,
            self.client.publish(topic, qos, false, payload),
        )
        .await
        .map_err(|_| TransferError::PublishTimeout(self.publish_timeout))??;
        Ok(())
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    /// Number of QoS 1/2 publishes the broker has acknowledged so far.
    pub fn acknowledged(&self) -> u64 {
        self.acknowledged.load(Ordering::Relaxed)
    }

    /// Closes the session gracefully.
    ///
    /// Sends DISCONNECT after the already queued publishes and waits for the
    /// connection kernel to finish. Calling it again is a no-op.
    pub async fn disconnect(&self) -> Result<(), TransferError> {
        let handle = match self.kernel.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(handle) = handle else {
            debug!("Session already disconnected");
            return Ok(());
        };

        self.cancel.cancel();
        match handle.await {
            Ok(result) => {
                info!("Disconnected from MQTT broker");
                result
            }
            Err(e) => Err(TransferError::ConnectionKernel(e.to_string())),
        }
    }
}

impl Drop for MqttSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Maps a numeric QoS level to rumqttc's enum.
pub fn qos_from_u8(qos: u8) -> Result<QoS, TransferError> {
    match qos {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(TransferError::InvalidMetadata(format!(
            "QoS must be 0, 1 or 2, got {other}"
        ))),
    }
}

fn validate_topic(topic: &str) -> Result<(), TransferError> {
    if topic.is_empty() {
        return Err(TransferError::InvalidMetadata("topic is empty".into()));
    }
    if topic.contains(['+', '#']) {
        return Err(TransferError::InvalidMetadata(format!(
            "topic '{topic}' contains a wildcard"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qos_mapping() {
        assert_eq!(qos_from_u8(0).unwrap(), QoS::AtMostOnce);
        assert_eq!(qos_from_u8(1).unwrap(), QoS::AtLeastOnce);
        assert_eq!(qos_from_u8(2).unwrap(), QoS::ExactlyOnce);
        assert!(matches!(
            qos_from_u8(3),
            Err(TransferError::InvalidMetadata(_))
        ));
    }

    #[test]
    fn test_topic_validation() {
        assert!(validate_topic("home/livingroom/temperature").is_ok());
        assert!(validate_topic("").is_err());
        assert!(validate_topic("home/+/temperature").is_err());
        assert!(validate_topic("home/#").is_err());
    }

    #[test]
    fn test_manager_rejects_invalid_config() {
        let result = MqttManager::new("", 1883);
        assert!(matches!(result, Err(TransferError::ConfigError(_))));
    }

    #[test]
    fn test_manager_keeps_config() {
        let manager = MqttManager::new("broker.local", 1884).unwrap();
        assert_eq!(manager.config().endpoint(), "broker.local:1884");
    }

    #[tokio::test]
    async fn test_connect_fails_without_broker() {
        let config = Config {
            host: "127.0.0.1".into(),
            port: 1,
            connection_timeout: 2,
            ..Default::default()
        };
        let result = MqttManager::from_config(config).unwrap().connect().await;
        assert!(result.is_err());
    }
}
