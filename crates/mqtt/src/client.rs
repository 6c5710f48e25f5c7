//! MQTT client builder.
//!
//! `ClientBuilder` turns a validated [`Config`] into rumqttc's `AsyncClient`
//! and `EventLoop` pair. The client is cloned into publishers; the event loop
//! is handed to the [`ConnectionKernel`](crate::connection::ConnectionKernel),
//! which is the only place it is polled.
//!
//! ```ignore
//! let (client, event_loop) = ClientBuilder::from_config(&config)?.build()?;
//! ```

use std::time::Duration;

use rumqttc::{AsyncClient, EventLoop, MqttOptions};
use validator::Validate;

use super::{config::Config, error::TransferError};

/// Builder for the rumqttc client and event loop.
pub struct ClientBuilder {
    /// MQTT protocol options (host, port, keep-alive, credentials, ...)
    opts: MqttOptions,

    /// Capacity of the client request queue.
    cap: usize,
}

impl ClientBuilder {
    /// Creates a builder with rumqttc defaults for everything but the endpoint.
    pub fn new(client_id: impl Into<String>, host: impl Into<String>, port: u16, cap: usize) -> Self {
        Self {
            opts: MqttOptions::new(client_id, host, port),
            cap,
        }
    }

    /// Creates a builder from a `Config`, validating it first.
    ///
    /// # Errors
    ///
    /// Returns `TransferError::ConfigError` if any field is out of range.
    pub fn from_config(config: &Config) -> Result<Self, TransferError> {
        config.validate()?;

        let mut builder = Self::new(
            config.effective_client_id(),
            config.host.clone(),
            config.port,
            config.request_channel_capacity,
        )
        .keep_alive(config.keep_alive)
        .clean_session(config.clean_session)
        .max_inflight(config.max_inflight);

        if let Some(max_packet_size) = config.max_packet_size {
            builder = builder.max_packet_size(max_packet_size, max_packet_size);
        }

        if let Some(username) = &config.username {
            builder = builder.credentials(
                username.clone(),
                config.password.clone().unwrap_or_default(),
            );
        }

        Ok(builder)
    }

    /// Keep-alive interval in seconds; the client pings when idle this long.
    pub fn keep_alive(mut self, secs: u64) -> Self {
        self.opts.set_keep_alive(Duration::from_secs(secs));
        self
    }

    pub fn max_packet_size(mut self, incoming: usize, outgoing: usize) -> Self {
        self.opts.set_max_packet_size(incoming, outgoing);
        self
    }

    pub fn clean_session(mut self, clean: bool) -> Self {
        self.opts.set_clean_session(clean);
        self
    }

    /// Username/password sent in the CONNECT packet.
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.opts.set_credentials(username, password);
        self
    }

    /// Upper bound of unacknowledged QoS 1/2 publishes.
    pub fn max_inflight(mut self, max: u16) -> Self {
        self.opts.set_inflight(max);
        self
    }

    /// Client identifier that will be presented to the broker.
    pub fn client_id(&self) -> String {
        self.opts.client_id()
    }

    /// Consumes the builder and creates the client and its event loop.
    ///
    /// No network traffic happens here; the connection is opened by the first
    /// poll of the event loop.
    pub fn build(self) -> Result<(AsyncClient, EventLoop), TransferError> {
        if self.cap == 0 {
            return Err(TransferError::ClientSetup(
                "request channel capacity must be positive".into(),
            ));
        }
        Ok(AsyncClient::new(self.opts, self.cap))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_creation() {
        let builder = ClientBuilder::new("test_client", "localhost", 1883, 100);
        assert_eq!(builder.cap, 100);
        assert_eq!(builder.client_id(), "test_client");
    }

    #[test]
    fn test_builder_with_chain_methods() {
        let builder = ClientBuilder::new("test_client", "localhost", 1883, 10)
            .keep_alive(30)
            .max_packet_size(1024, 1024)
            .clean_session(true)
            .credentials("user", "pass")
            .max_inflight(50);

        assert!(builder.build().is_ok());
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let result = ClientBuilder::new("test_client", "localhost", 1883, 0).build();
        assert!(matches!(result, Err(TransferError::ClientSetup(_))));
    }

    #[test]
    fn test_build_from_config() {
        let config = Config {
            client_id: "thermosim-test".into(),
            username: Some("sim".into()),
            password: Some("pw".into()),
            max_packet_size: Some(2048),
            ..Default::default()
        };

        let builder = ClientBuilder::from_config(&config).unwrap();
        assert_eq!(builder.client_id(), "thermosim-test");
        assert!(builder.build().is_ok());
    }

    #[test]
    fn test_build_from_config_generates_client_id() {
        let builder = ClientBuilder::from_config(&Config::default()).unwrap();
        assert!(builder.client_id().starts_with("thermosim-"));
    }

    #[test]
    fn test_build_from_config_invalid() {
        let config = Config {
            host: "".to_string(),
            ..Default::default()
        };

        let result = ClientBuilder::from_config(&config);
        assert!(matches!(result, Err(TransferError::ConfigError(_))));
    }
}
