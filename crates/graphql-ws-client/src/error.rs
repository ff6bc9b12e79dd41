//! Error types for the graphql-ws client.

/// Errors produced by the client, the protocol engine and the transport.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// Invalid URL provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    /// Invalid header name or value.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),
    /// The transport failed (connect, read or write).
    #[error("Transport error: {0}")]
    Transport(String),
    /// The transport is not connected.
    #[error("Not connected")]
    NotConnected,
    /// A configured timeout elapsed.
    #[error("Operation timed out")]
    Timeout,
    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),
    /// The peer violated the graphql-ws protocol.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    /// The server reported an error for a query.
    ///
    /// Carries the message of the first error document.
    #[error("{message}")]
    Query {
        /// Message of the first reported error.
        message: String,
    },
    /// The worker runtime could not be started.
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl Error {
    /// Create a query error from a message.
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
        }
    }

    /// Check whether this error is a protocol violation.
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }
}

/// Violations of the graphql-ws protocol.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// A text frame was not valid JSON.
    #[error("Invalid JSON message: {0}")]
    InvalidJson(String),
    /// A message was not a JSON object.
    #[error("graphql-ws message is not an object")]
    NotAnObject,
    /// A message had no string `type` field.
    #[error("graphql-ws message has no string type field")]
    MissingType,
    /// A required field was absent or had the wrong shape.
    #[error("graphql-ws {message_type} message is missing field '{field}'")]
    MissingField {
        /// The `type` of the offending message.
        message_type: String,
        /// The missing field.
        field: &'static str,
    },
    /// The message type is not part of the protocol.
    #[error("Unknown graphql-ws message type: {0}")]
    UnknownMessageType(String),
    /// A second `connection_ack` arrived.
    #[error("Received graphql-ws connection_ack twice")]
    DuplicateAck,
    /// A transport frame kind this client does not handle.
    #[error("Unsupported transport frame: {0}")]
    UnsupportedFrame(&'static str),
}

impl ProtocolError {
    /// Create a missing field error.
    pub fn missing_field(message_type: impl Into<String>, field: &'static str) -> Self {
        Self::MissingField {
            message_type: message_type.into(),
            field,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

impl From<http::header::InvalidHeaderName> for Error {
    fn from(err: http::header::InvalidHeaderName) -> Self {
        Self::InvalidHeader(err.to_string())
    }
}

impl From<http::header::InvalidHeaderValue> for Error {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        Self::InvalidHeader(err.to_string())
    }
}

impl From<graphql_ws_core::RuntimeError> for Error {
    fn from(err: graphql_ws_core::RuntimeError) -> Self {
        Self::Runtime(err.to_string())
    }
}

/// A specialized Result type for graphql-ws operations.
pub type Result<T> = std::result::Result<T, Error>;
