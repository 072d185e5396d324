//! Transport adapter for the single duplex connection to the agent.
//! - Transport/Connector: seams implemented by the WebSocket client and test doubles
//! - Connection: lifecycle state and the one live transport

use std::fmt;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::SessionError;

/// Connection lifecycle events raised by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Closed,
    Errored(String),
    Message(String),
}

/// One duplex, message-oriented connection.
pub trait Transport {
    /// Queue or write one text message.
    fn send(&mut self, text: &str) -> Result<(), SessionError>;

    /// Wait up to `timeout` for the next lifecycle event.
    fn poll(&mut self, timeout: Duration) -> Option<TransportEvent>;

    /// Close the connection; no further events are delivered.
    fn close(&mut self);
}

/// Factory for transports bound to an agent address.
pub trait Connector {
    fn connect(&mut self, address: &str) -> Result<Box<dyn Transport>, SessionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
        };
        f.write_str(text)
    }
}

/// Owns at most one transport at a time.
pub struct Connection {
    state: ConnectionState,
    transport: Option<Box<dyn Transport>>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state)
            .field("attached", &self.transport.is_some())
            .finish()
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl Connection {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            transport: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    /// Attach a fresh transport. Returns `Ok(false)` when one is already attached.
    ///
    /// A `true` result starts a new protocol epoch; the caller must discard any
    /// correlation state from the previous one.
    pub fn connect(
        &mut self,
        connector: &mut dyn Connector,
        address: &str,
    ) -> Result<bool, SessionError> {
        if self.transport.is_some() {
            debug!("connect ignored, transport already attached");
            return Ok(false);
        }
        self.state = ConnectionState::Connecting;
        match connector.connect(address) {
            Ok(transport) => {
                info!(address, "connected to diagnostic agent");
                self.transport = Some(transport);
                self.state = ConnectionState::Open;
                Ok(true)
            }
            Err(err) => {
                warn!(address, "connect failed: {err}");
                self.state = ConnectionState::Disconnected;
                Err(err)
            }
        }
    }

    /// Detach the transport before closing it, so it can no longer deliver events.
    pub fn disconnect(&mut self) {
        let Some(mut transport) = self.transport.take() else {
            return;
        };
        self.state = ConnectionState::Closing;
        transport.close();
        self.state = ConnectionState::Disconnected;
        debug!("transport detached and closed");
    }

    /// Fire-and-forget write. Failures are only logged.
    pub fn send(&mut self, text: &str) -> Result<(), SessionError> {
        let transport = self.transport.as_mut().ok_or(SessionError::NotConnected)?;
        if let Err(err) = transport.send(text) {
            warn!("send failed: {err}");
        }
        Ok(())
    }

    #[must_use]
    pub fn poll(&mut self, timeout: Duration) -> Option<TransportEvent> {
        let event = self.transport.as_mut()?.poll(timeout);
        if matches!(event, Some(TransportEvent::Closed)) {
            self.transport = None;
            self.state = ConnectionState::Disconnected;
        }
        event
    }
}
