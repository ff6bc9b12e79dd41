//! Duplex message transports for the protocol engine.
//!
//! The engine only needs a small contract from its transport:
//!
//! - [`Transport::start`] opens the connection and delivers every lifecycle
//!   event and inbound frame to an [`EventHandler`], on the transport's own
//!   thread
//! - [`Transport::send_text`] queues one text frame, from any thread
//! - [`Transport::stop`] closes the connection and drops the handler
//!
//! [`WebSocketTransport`] implements it over `tokio-tungstenite`.

#[cfg(test)]
pub(crate) mod mock;
mod websocket;

use std::sync::Arc;

use crate::error::Result;

pub use websocket::WebSocketTransport;

/// An event delivered by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection is open; frames can be sent.
    Open,
    /// A complete text frame arrived.
    Message(String),
    /// The transport failed; no further events follow.
    Error(String),
    /// The peer closed the connection; no further events follow.
    ///
    /// `code` is absent when the stream ended without a close frame.
    Close {
        /// Close code sent by the peer.
        code: Option<u16>,
        /// Close reason sent by the peer, possibly empty.
        reason: String,
    },
    /// A transport-level ping arrived (answered by the transport).
    Ping,
    /// A transport-level pong arrived.
    Pong,
    /// A raw frame fragment arrived.
    Fragment,
    /// A binary frame arrived.
    Binary(Vec<u8>),
}

/// Receives transport events.
///
/// An `Err` return is fatal: the transport closes the connection and stops
/// delivering events.
pub type EventHandler = Arc<dyn Fn(TransportEvent) -> Result<()> + Send + Sync>;

/// A bidirectional text-frame connection.
pub trait Transport: Send + Sync {
    /// Open the connection, delivering events to `handler`.
    fn start(&self, handler: EventHandler) -> Result<()>;

    /// Queue a text frame for sending.
    fn send_text(&self, text: String) -> Result<()>;

    /// Close the connection and release the event handler.
    ///
    /// Calling this more than once is a no-op.
    fn stop(&self);
}

/// Current state of a transport connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TransportState {
    /// Not connected to any server.
    #[default]
    Disconnected,
    /// Currently attempting to connect.
    Connecting,
    /// Connected and ready to send/receive frames.
    Connected,
    /// Stopped; the transport cannot be started again.
    Stopped,
}
