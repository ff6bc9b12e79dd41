//! Wire messages of the graphql-transport-ws protocol.
//!
//! See: https://github.com/enisdenjo/graphql-ws/blob/master/PROTOCOL.md
//!
//! Outbound messages are serialized with serde. Inbound messages are
//! checked field by field so that every violation maps to a precise
//! [`ProtocolError`].

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{ProtocolError, Result};

/// WebSocket subprotocol name announced during the handshake.
pub const SUBPROTOCOL: &str = "graphql-transport-ws";

/// Query variables: variable name to JSON value.
pub type Variables = Map<String, Value>;

/// Client -> Server messages.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Initialize the connection.
    ConnectionInit {
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
    /// Start an operation.
    Subscribe {
        id: String,
        payload: SubscribePayload,
    },
    /// Stop an operation.
    Complete { id: String },
    /// Answer to a server `ping`.
    Pong,
}

impl ClientMessage {
    /// Serialize to the text frame sent on the wire.
    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Payload of a `subscribe` message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscribePayload {
    /// The opaque query document.
    pub query: String,
    /// Query variables, sent as an object even when empty.
    pub variables: Variables,
}

/// Server -> Client messages.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// The server accepted `connection_init`.
    ConnectionAck { payload: Option<Value> },
    /// Protocol-level heartbeat; must be answered with `pong`.
    Ping,
    /// Protocol-level heartbeat answer.
    Pong,
    /// One result for an operation.
    Next { id: String, payload: Value },
    /// The operation failed; no further results follow.
    Error { id: String, payload: Vec<Value> },
    /// The operation finished.
    Complete { id: String },
}

impl ServerMessage {
    /// Parse a text frame.
    pub fn parse(text: &str) -> std::result::Result<Self, ProtocolError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
        Self::from_value(value)
    }

    /// Interpret a parsed JSON document.
    pub fn from_value(value: Value) -> std::result::Result<Self, ProtocolError> {
        let Value::Object(mut object) = value else {
            return Err(ProtocolError::NotAnObject);
        };

        let message_type = match object.remove("type") {
            Some(Value::String(message_type)) => message_type,
            _ => return Err(ProtocolError::MissingType),
        };

        match message_type.as_str() {
            "connection_ack" => Ok(Self::ConnectionAck {
                payload: object.remove("payload"),
            }),
            "ping" => Ok(Self::Ping),
            "pong" => Ok(Self::Pong),
            "next" => {
                let id = take_id(&mut object, &message_type)?;
                let payload = object
                    .remove("payload")
                    .ok_or_else(|| ProtocolError::missing_field(&message_type, "payload"))?;
                Ok(Self::Next { id, payload })
            }
            "error" => {
                let id = take_id(&mut object, &message_type)?;
                let payload = match object.remove("payload") {
                    Some(Value::Array(errors)) => errors,
                    _ => return Err(ProtocolError::missing_field(&message_type, "payload")),
                };
                Ok(Self::Error { id, payload })
            }
            "complete" => {
                let id = take_id(&mut object, &message_type)?;
                Ok(Self::Complete { id })
            }
            _ => Err(ProtocolError::UnknownMessageType(message_type)),
        }
    }

    /// The wire name of this message's type.
    pub fn message_type(&self) -> &'static str {
        match self {
            Self::ConnectionAck { .. } => "connection_ack",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Next { .. } => "next",
            Self::Error { .. } => "error",
            Self::Complete { .. } => "complete",
        }
    }
}

// Ids travel as JSON strings and are compared textually.
fn take_id(
    object: &mut Map<String, Value>,
    message_type: &str,
) -> std::result::Result<String, ProtocolError> {
    match object.remove("id") {
        Some(Value::String(id)) => Ok(id),
        _ => Err(ProtocolError::missing_field(message_type, "id")),
    }
}
