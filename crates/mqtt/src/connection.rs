//! Event loop driver for the MQTT session.
//!
//! `ConnectionKernel` is the only owner of rumqttc's `EventLoop`. It runs in
//! two phases:
//!
//! 1. [`establish`](ConnectionKernel::establish) polls until the broker answers
//!    CONNACK. Any error here is returned to the caller, which treats it as
//!    fatal.
//! 2. [`run`](ConnectionKernel::run) keeps polling in a background task so
//!    queued publishes reach the socket and acknowledgements are consumed. On
//!    cancellation it sends DISCONNECT and flushes it before returning.
//!
//! ```text
//! MqttSession ──publish──> AsyncClient ──queue──> EventLoop (kernel task) ──> broker
//!      │                                               │
//!      └──────────── watch<ConnectionState> <──────────┘
//! ```

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, Outgoing, Packet,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::{error::TransferError, state::ConnectionState};

/// Upper bound for flushing the DISCONNECT packet during shutdown.
const DISCONNECT_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Drives the MQTT event loop and reports the session state.
pub struct ConnectionKernel {
    /// The MQTT client, used here only to request DISCONNECT
    client: AsyncClient,

    /// The event loop that owns the socket
    event_loop: EventLoop,

    /// Shutdown request from the session
    cancel: CancellationToken,

    /// Delay before the event loop is polled again after a connection error
    reconnect_delay: Duration,

    /// Number of QoS 1/2 publishes acknowledged by the broker
    acknowledged: Arc<AtomicU64>,

    state_tx: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl ConnectionKernel {
    pub fn new(
        client: AsyncClient,
        event_loop: EventLoop,
        cancel: CancellationToken,
        reconnect_delay: Duration,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        Self {
            client,
            event_loop,
            cancel,
            reconnect_delay,
            acknowledged: Arc::new(AtomicU64::new(0)),
            state_tx,
            state_rx,
        }
    }

    /// Receiver that observes every state change.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Shared counter of broker acknowledgements.
    pub fn acknowledged(&self) -> Arc<AtomicU64> {
        self.acknowledged.clone()
    }

    /// Broadcasts `state` if it differs from the current one.
    fn update_state(&self, state: ConnectionState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current != state {
                *current = state.clone();
                true
            } else {
                false
            }
        });
        if changed {
            debug!("Connection state changed to: {}", state);
        }
    }

    /// Performs the initial handshake.
    ///
    /// Polls the event loop until CONNACK arrives or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// - `TransferError::ClientConnection` if the socket cannot be opened
    /// - `TransferError::ConnectionRefused` if the broker rejects CONNECT
    /// - `TransferError::ConnectTimeout` if no CONNACK arrives in time
    pub async fn establish(&mut self, timeout: Duration) -> Result<(), TransferError> {
        self.update_state(ConnectionState::Connecting);

        let outcome = tokio::time::timeout(timeout, Self::await_connack(&mut self.event_loop)).await;
        let result = match outcome {
            Ok(result) => result,
            Err(_) => Err(TransferError::ConnectTimeout(timeout)),
        };

        match &result {
            Ok(()) => {
                info!("Connection established successfully");
                self.update_state(ConnectionState::Connected);
            }
            Err(e) => {
                debug!("Initial connection failed: {e:?}");
                self.update_state(ConnectionState::Disconnected(e.to_string()));
            }
        }
        result
    }

    async fn await_connack(event_loop: &mut EventLoop) -> Result<(), TransferError> {
        loop {
            match event_loop.poll().await? {
                Event::Incoming(Packet::ConnAck(ack)) => {
                    return match ack.code {
                        ConnectReturnCode::Success => Ok(()),
                        code => Err(TransferError::ConnectionRefused(format!("{code:?}"))),
                    };
                }
                event => trace!("Event before CONNACK: {:?}", event),
            }
        }
    }

    /// Keeps the session alive until cancellation.
    ///
    /// Transient network errors are logged and the loop waits
    /// `reconnect_delay` before polling again, which makes rumqttc dial anew.
    /// Fatal errors (refused credentials, protocol violations) end the task.
    pub async fn run(mut self) -> Result<(), TransferError> {
        debug!("Connection event loop running");
        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    self.shutdown().await;
                    return Ok(());
                }

                event = self.event_loop.poll() => match event {
                    Ok(event) => self.handle_event(event),
                    Err(e) => {
                        let reason = get_error_message(&e);
                        if is_fatal_error(&e) {
                            error!("Fatal connection error, session stopped: {}", reason);
                            self.update_state(ConnectionState::Disconnected(reason));
                            return Err(TransferError::from(e));
                        }

                        warn!(
                            "Connection lost ({}), retrying in {:.1}s",
                            reason,
                            self.reconnect_delay.as_secs_f64()
                        );
                        self.update_state(ConnectionState::Disconnected(reason));
                        self.update_state(ConnectionState::Reconnecting(
                            self.reconnect_delay.as_secs_f64(),
                        ));

                        tokio::select! {
                            _ = self.cancel.cancelled() => {
                                self.update_state(ConnectionState::Closed);
                                return Ok(());
                            }
                            _ = tokio::time::sleep(self.reconnect_delay) => {
                                self.update_state(ConnectionState::Connecting);
                            }
                        }
                    }
                }
            }
        }
    }

    fn handle_event(&self, event: Event) {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => {
                if ack.code == ConnectReturnCode::Success {
                    info!("Connection re-established");
                    self.update_state(ConnectionState::Connected);
                } else {
                    warn!("Broker refused reconnection: {:?}", ack.code);
                }
            }
            Event::Incoming(Packet::PubAck(ack)) => {
                self.acknowledged.fetch_add(1, Ordering::Relaxed);
                trace!("PUBACK for packet {}", ack.pkid);
            }
            Event::Incoming(Packet::PubComp(comp)) => {
                self.acknowledged.fetch_add(1, Ordering::Relaxed);
                trace!("PUBCOMP for packet {}", comp.pkid);
            }
            Event::Incoming(Packet::Disconnect) => {
                warn!("Disconnected by broker");
                self.update_state(ConnectionState::Disconnected(
                    "Disconnected by broker".into(),
                ));
            }
            Event::Incoming(packet) => trace!("Incoming packet: {:?}", packet),
            Event::Outgoing(outgoing) => trace!("Outgoing packet: {:?}", outgoing),
        }
    }

    /// Sends DISCONNECT and polls until it has been written.
    ///
    /// Publishes queued before the request are written first since the event
    /// loop drains its request queue in order.
    async fn shutdown(&mut self) {
        if !self.state_rx.borrow().is_connected() {
            debug!("Session not connected, skipping DISCONNECT");
            self.update_state(ConnectionState::Closed);
            return;
        }

        if let Err(e) = self.client.try_disconnect() {
            warn!("Error queueing disconnect packet: {:?}", e);
            self.update_state(ConnectionState::Closed);
            return;
        }

        let flush = async {
            loop {
                match self.event_loop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => return true,
                    Ok(event) => self.handle_event(event),
                    Err(e) => {
                        debug!("Event loop ended during shutdown: {}", get_error_message(&e));
                        return false;
                    }
                }
            }
        };

        match tokio::time::timeout(DISCONNECT_FLUSH_TIMEOUT, flush).await {
            Ok(true) => info!("DISCONNECT sent to broker"),
            Ok(false) => warn!("Connection closed before DISCONNECT could be sent"),
            Err(_) => warn!(
                "DISCONNECT not flushed within {:?}, closing socket",
                DISCONNECT_FLUSH_TIMEOUT
            ),
        }
        self.update_state(ConnectionState::Closed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    // Retrying cannot help
    Fatal,
    // Transient; the event loop may dial again
    Reconnect,
}

fn classify_connection_error(err: &ConnectionError) -> Disposition {
    use Disposition::*;

    match err {
        ConnectionError::MqttState(_) => Fatal,
        ConnectionError::NotConnAck(_) => Fatal,
        ConnectionError::RequestsDone => Fatal,

        ConnectionError::Io(e) => match e.kind() {
            std::io::ErrorKind::AddrInUse
            | std::io::ErrorKind::PermissionDenied
            | std::io::ErrorKind::InvalidInput
            | std::io::ErrorKind::InvalidData => Fatal,
            _ => Reconnect,
        },

        ConnectionError::NetworkTimeout | ConnectionError::FlushTimeout => Reconnect,

        ConnectionError::ConnectionRefused(code) => match code {
            ConnectReturnCode::RefusedProtocolVersion
            | ConnectReturnCode::BadClientId
            | ConnectReturnCode::BadUserNamePassword
            | ConnectReturnCode::NotAuthorized => Fatal,
            _ => Reconnect,
        },

        // TLS and future variants
        #[allow(unreachable_patterns)]
        _ => Reconnect,
    }
}

fn is_fatal_error(err: &ConnectionError) -> bool {
    matches!(classify_connection_error(err), Disposition::Fatal)
}

/// Innermost message of an error chain, without surrounding quotes.
fn get_error_message(e: &dyn std::error::Error) -> String {
    let mut current = e;
    while let Some(source) = current.source() {
        current = source;
    }
    current.to_string().trim_matches('"').to_string()
}
