//! Connection state of the MQTT session.
//!
//! The connection kernel publishes a `ConnectionState` on a watch channel
//! every time the session changes phase. Publishers consult it to fail fast
//! while the broker is unreachable.

use std::fmt;

/// Current phase of the broker session.
///
/// - `Connecting` -> `Connected` (CONNACK accepted)
/// - `Connected` -> `Disconnected` (broker closed the socket, network error)
/// - `Disconnected` -> `Reconnecting` -> `Connecting` (event loop re-dials)
/// - any -> `Closed` (clean shutdown requested by the application)
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// CONNECT sent, waiting for CONNACK.
    Connecting,

    /// Session is up; publishes are accepted.
    Connected,

    /// Session lost. The string carries the reason.
    Disconnected(String),

    /// Waiting this many seconds before the event loop dials again.
    Reconnecting(f64),

    /// DISCONNECT was sent (or the session was torn down); terminal.
    Closed,
}

impl ConnectionState {
    /// Short identifier for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Disconnected(_) => "Disconnected",
            ConnectionState::Reconnecting(_) => "Reconnecting",
            ConnectionState::Closed => "Closed",
        }
    }

    /// Reason or delay attached to the state, empty for the others.
    pub fn details(&self) -> String {
        match self {
            ConnectionState::Disconnected(reason) => reason.clone(),
            ConnectionState::Reconnecting(seconds) => format!("in {seconds} seconds"),
            _ => String::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())?;
        let details = self.details();
        if !details.is_empty() {
            write!(f, " ({details})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_as_str() {
        assert_eq!(ConnectionState::Connecting.as_str(), "Connecting");
        assert_eq!(ConnectionState::Connected.as_str(), "Connected");
        assert_eq!(ConnectionState::Closed.as_str(), "Closed");
        assert_eq!(
            ConnectionState::Disconnected("test".into()).as_str(),
            "Disconnected"
        );
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Connected.to_string(), "Connected");
        assert_eq!(
            ConnectionState::Reconnecting(2.0).to_string(),
            "Reconnecting (in 2 seconds)"
        );
        assert_eq!(
            ConnectionState::Disconnected("broker closed".into()).to_string(),
            "Disconnected (broker closed)"
        );
    }

    #[test]
    fn test_is_connected() {
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());
        assert!(!ConnectionState::Closed.is_connected());
        assert!(!ConnectionState::Reconnecting(1.0).is_connected());
    }
}
