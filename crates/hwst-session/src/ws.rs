//! WebSocket transport backed by a blocking `tungstenite` client.

use std::io;
use std::net::TcpStream;
use std::time::Duration;

use tracing::{debug, warn};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use crate::error::SessionError;
use crate::transport::{Connector, Transport, TransportEvent};

const MIN_POLL: Duration = Duration::from_millis(1);

/// Connects to `ws://` agent addresses.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn connect(&mut self, address: &str) -> Result<Box<dyn Transport>, SessionError> {
        let (socket, response) = tungstenite::connect(address)
            .map_err(|err| SessionError::Transport(format!("{address}: {err}").into()))?;
        debug!(status = %response.status(), "websocket handshake complete");
        Ok(Box::new(WsTransport::new(socket)))
    }
}

pub struct WsTransport {
    socket: WebSocket<MaybeTlsStream<TcpStream>>,
    opened: bool,
    closed: bool,
}

impl WsTransport {
    fn new(socket: WebSocket<MaybeTlsStream<TcpStream>>) -> Self {
        Self {
            socket,
            opened: false,
            closed: false,
        }
    }

    fn set_read_timeout(&mut self, timeout: Duration) {
        if let MaybeTlsStream::Plain(stream) = self.socket.get_mut() {
            if let Err(err) = stream.set_read_timeout(Some(timeout.max(MIN_POLL))) {
                warn!("set websocket read timeout: {err}");
            }
        }
    }
}

impl Transport for WsTransport {
    fn send(&mut self, text: &str) -> Result<(), SessionError> {
        self.socket
            .send(Message::text(text.to_owned()))
            .map_err(|err| SessionError::Transport(err.to_string().into()))
    }

    fn poll(&mut self, timeout: Duration) -> Option<TransportEvent> {
        if self.closed {
            return Some(TransportEvent::Closed);
        }
        // The handshake already completed inside `connect`.
        if !self.opened {
            self.opened = true;
            return Some(TransportEvent::Opened);
        }
        self.set_read_timeout(timeout);
        match self.socket.read() {
            Ok(Message::Text(text)) => Some(TransportEvent::Message(text.as_str().to_owned())),
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => Some(TransportEvent::Message(text)),
                Err(_) => {
                    debug!("dropping non utf-8 binary frame");
                    None
                }
            },
            Ok(Message::Close(_)) => {
                self.closed = true;
                Some(TransportEvent::Closed)
            }
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => None,
            Err(tungstenite::Error::Io(err))
                if matches!(
                    err.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) =>
            {
                None
            }
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                self.closed = true;
                Some(TransportEvent::Closed)
            }
            Err(err) => {
                self.closed = true;
                Some(TransportEvent::Errored(err.to_string()))
            }
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(err) = self.socket.close(None) {
            debug!("websocket close: {err}");
        }
        if let Err(err) = self.socket.flush() {
            debug!("websocket flush on close: {err}");
        }
    }
}
