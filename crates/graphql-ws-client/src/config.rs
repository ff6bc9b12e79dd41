//! Connection configuration.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::error::{Error, Result};

/// Configuration for a graphql-ws connection.
///
/// Timeouts default to `None`: the handshake and blocking requests wait
/// for the server indefinitely unless a timeout is configured.
///
/// # Example
///
/// ```ignore
/// let config = ConnectionConfig::new("wss://api.example.com/graphql")
///     .bearer_auth("my-token")
///     .handshake_timeout(Duration::from_secs(10));
/// ```
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// The WebSocket URL (ws:// or wss://).
    pub url: String,
    /// Custom headers to send during the WebSocket handshake.
    pub headers: HashMap<String, String>,
    /// Payload of the `connection_init` message (e.g., auth tokens).
    pub init_payload: Option<Value>,
    /// How long construction waits for `connection_ack`.
    pub handshake_timeout: Option<Duration>,
    /// How long a blocking request waits for its reply.
    pub request_timeout: Option<Duration>,
}

impl ConnectionConfig {
    /// Create a configuration for the given WebSocket URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            init_payload: None,
            handshake_timeout: None,
            request_timeout: None,
        }
    }

    /// Create a configuration from a bare `host:port/path` address.
    ///
    /// Addresses without a scheme are given `ws://`.
    pub fn from_address(address: impl AsRef<str>) -> Self {
        let address = address.as_ref();
        if address.contains("://") {
            Self::new(address)
        } else {
            Self::new(format!("ws://{address}"))
        }
    }

    /// Add a custom header for the WebSocket handshake.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Add multiple headers.
    pub fn headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Set bearer token authentication.
    ///
    /// This adds the Authorization header and, unless an init payload was
    /// set explicitly, includes the token in the `connection_init` payload.
    pub fn bearer_auth(mut self, token: impl AsRef<str>) -> Self {
        let value = format!("Bearer {}", token.as_ref());
        self.headers.insert("Authorization".into(), value.clone());
        if self.init_payload.is_none() {
            self.init_payload = Some(serde_json::json!({ "Authorization": value }));
        }
        self
    }

    /// Set the `connection_init` payload.
    pub fn init_payload(mut self, payload: impl Serialize) -> Result<Self> {
        self.init_payload = Some(serde_json::to_value(payload)?);
        Ok(self)
    }

    /// Set how long construction waits for `connection_ack`.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = Some(timeout);
        self
    }

    /// Set how long a blocking request waits for its reply.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Parse and check the URL.
    pub fn parsed_url(&self) -> Result<Url> {
        let url = Url::parse(&self.url)?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            scheme => Err(Error::InvalidUrl(format!(
                "unsupported scheme '{scheme}', expected ws or wss"
            ))),
        }
    }
}
