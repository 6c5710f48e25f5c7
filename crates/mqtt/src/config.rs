//! Broker connection settings.
//!
//! `Config` is deserialized from the `[transport]` table of the settings file
//! and can be overridden field by field from the command line. All limits are
//! enforced with `validator` so an unusable value fails at startup, before any
//! socket is opened.
//!
//! ```toml
//! [transport]
//! host = "localhost"
//! port = 1883
//! keep_alive = 60
//! client_id = ""          # empty: generated as thermosim-<uuid>
//! username = "sim"
//! password = "secret"
//! connection_timeout = 10
//! publish_timeout = 5
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Prefix of generated client identifiers.
pub const CLIENT_ID_PREFIX: &str = "thermosim";

/// MQTT connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(default)]
#[validate(schema(function = "validate_credentials"))]
pub struct Config {
    /// Broker hostname or IP address.
    #[validate(length(
        min = 1,
        max = 255,
        message = "Host must be between 1 and 255 characters"
    ))]
    pub host: String,

    /// Broker port, 1883 for plain MQTT.
    #[validate(range(min = 1, message = "Port must be between 1 and 65535"))]
    pub port: u16,

    /// Keep-alive interval in seconds.
    #[validate(range(
        min = 5,
        max = 3600,
        message = "Keep alive must be between 5 and 3600 seconds"
    ))]
    pub keep_alive: u64,

    /// Client identifier. Empty means one is generated per connection.
    #[validate(length(max = 64, message = "Client ID must not exceed 64 characters"))]
    pub client_id: String,

    /// Request a clean session from the broker.
    pub clean_session: bool,

    /// Optional broker credentials. A password requires a username.
    pub username: Option<String>,
    pub password: Option<String>,

    /// Seconds to wait for CONNACK before giving up.
    #[validate(range(
        min = 1,
        max = 300,
        message = "Connection timeout must be between 1 and 300 seconds"
    ))]
    pub connection_timeout: u64,

    /// Seconds a publish may wait for room in the request queue.
    #[validate(range(
        min = 1,
        max = 300,
        message = "Publish timeout must be between 1 and 300 seconds"
    ))]
    pub publish_timeout: u64,

    /// Seconds between re-dial attempts after a mid-run disconnect.
    #[validate(range(
        min = 1,
        max = 60,
        message = "Reconnect delay must be between 1 and 60 seconds"
    ))]
    pub reconnect_delay: u64,

    /// Maximum number of unacknowledged QoS 1/2 publishes.
    #[validate(range(
        min = 1,
        max = 1000,
        message = "Max inflight must be between 1 and 1000"
    ))]
    pub max_inflight: u16,

    /// Capacity of the client request queue.
    #[validate(range(
        min = 1,
        max = 65535,
        message = "Request channel capacity must be between 1 and 65535"
    ))]
    pub request_channel_capacity: usize,

    /// Maximum MQTT packet size in bytes, both directions.
    #[validate(range(
        min = 64,
        max = 268_435_455,
        message = "Max packet size must be between 64 and 268435455 bytes"
    ))]
    pub max_packet_size: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "localhost".to_string(),
            port: 1883,
            keep_alive: 60,
            client_id: String::new(),
            clean_session: true,
            username: None,
            password: None,
            connection_timeout: 10,
            publish_timeout: 5,
            reconnect_delay: 5,
            max_inflight: 100,
            request_channel_capacity: 64,
            max_packet_size: None,
        }
    }
}

impl Config {
    /// Client identifier to present to the broker.
    pub fn effective_client_id(&self) -> String {
        if self.client_id.is_empty() {
            format!("{}-{}", CLIENT_ID_PREFIX, Uuid::new_v4())
        } else {
            self.client_id.clone()
        }
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout)
    }

    pub fn publish_timeout(&self) -> Duration {
        Duration::from_secs(self.publish_timeout)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay)
    }

    /// `host:port` for log lines.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn validate_credentials(config: &Config) -> Result<(), ValidationError> {
    match (&config.username, &config.password) {
        (None, Some(_)) => {
            let mut err = ValidationError::new("password_without_username");
            err.message = Some("A password was configured without a username".into());
            Err(err)
        }
        (Some(user), _) if user.is_empty() => {
            let mut err = ValidationError::new("empty_username");
            err.message = Some("Username must not be empty".into());
            Err(err)
        }
        _ => Ok(()),
    }
}
