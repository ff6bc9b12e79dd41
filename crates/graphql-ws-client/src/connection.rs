//! The graphql-ws protocol engine.
//!
//! [`SubscriptionConnection`] owns one transport session. It performs the
//! `connection_init` / `connection_ack` handshake, assigns correlation ids
//! to outgoing operations, and routes inbound messages to the callback
//! registered for their id.
//!
//! # Threading
//!
//! Inbound events are dispatched on the transport's thread while
//! [`send`](SubscriptionConnection::send) may be called from any thread.
//! The callback registry is guarded by a mutex, but callbacks run after the
//! lock is released, so a callback may itself call `send` or release a
//! handle. Callbacks must not block on replies from the same connection:
//! those replies are dispatched on the thread the callback is running on.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use graphql_ws_core::logging::targets;
use graphql_ws_core::{ObserverSlot, OneShot};
use parking_lot::Mutex;
use serde_json::Value;

use crate::config::ConnectionConfig;
use crate::error::{Error, ProtocolError, Result};
use crate::handle::SubscriptionHandle;
use crate::protocol::{ClientMessage, ServerMessage, SubscribePayload, Variables};
use crate::transport::{EventHandler, Transport, TransportEvent, WebSocketTransport};

/// Callback invoked with each data payload of a subscription.
pub type ReplyCallback = Arc<dyn Fn(&Value) + Send + Sync>;

/// Observer for protocol anomalies that are not fatal by policy.
pub type ProtocolErrorObserver = dyn Fn(&str) + Send + Sync;

/// Progress of the `connection_init` / `connection_ack` exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandshakeState {
    /// `connection_init` is out (or about to be); no ack yet.
    AwaitingAck,
    /// The server acknowledged the connection.
    Acknowledged,
    /// The transport or the peer failed before the ack arrived.
    Failed,
}

/// State shared between the connection, the transport thread and handles.
struct Shared {
    transport: Arc<dyn Transport>,
    init_payload: Option<Value>,
    handshake: Mutex<HandshakeState>,
    handshake_result: OneShot<Result<()>>,
    next_id: AtomicU64,
    callbacks: Mutex<HashMap<String, ReplyCallback>>,
    on_protocol_error: ObserverSlot<ProtocolErrorObserver>,
}

impl Shared {
    fn send_message(&self, message: &ClientMessage) -> Result<()> {
        self.transport.send_text(message.to_text()?)
    }

    /// Transport entry point. Errors that occur before the ack fail the
    /// pending handshake; every error is also returned to the transport,
    /// which treats it as fatal.
    fn handle_event(&self, event: TransportEvent) -> Result<()> {
        let result = self.dispatch(event);
        if let Err(ref err) = result {
            self.fail_handshake(err.clone());
        }
        result
    }

    fn dispatch(&self, event: TransportEvent) -> Result<()> {
        match event {
            TransportEvent::Open => {
                tracing::debug!(target: targets::CONNECTION, "transport open, sending connection_init");
                self.send_message(&ClientMessage::ConnectionInit {
                    payload: self.init_payload.clone(),
                })
            }
            TransportEvent::Close { code, reason } => {
                let detail = match code {
                    Some(code) if reason.is_empty() => format!(" ({code})"),
                    Some(code) => format!(" ({code}: {reason})"),
                    None => String::new(),
                };
                let err = Error::Transport(format!("connection closed before connection_ack{detail}"));
                if !self.fail_handshake(err) {
                    tracing::debug!(target: targets::CONNECTION, ?code, %reason, "transport closed by peer");
                }
                Ok(())
            }
            TransportEvent::Error(reason) => {
                if self.fail_handshake(Error::Transport(reason.clone())) {
                    return Ok(());
                }
                tracing::warn!(target: targets::CONNECTION, %reason, "transport error");
                self.report_protocol_error(&reason);
                Ok(())
            }
            TransportEvent::Message(text) => {
                let message = ServerMessage::parse(&text)?;
                self.process(message)
            }
            TransportEvent::Ping => Ok(()),
            // This client never sends transport-level pings.
            TransportEvent::Pong => Err(ProtocolError::UnsupportedFrame("pong").into()),
            TransportEvent::Fragment => Err(ProtocolError::UnsupportedFrame("fragment").into()),
            TransportEvent::Binary(_) => Err(ProtocolError::UnsupportedFrame("binary").into()),
        }
    }

    fn process(&self, message: ServerMessage) -> Result<()> {
        tracing::trace!(target: targets::CONNECTION, message_type = message.message_type(), "received");
        match message {
            ServerMessage::ConnectionAck { .. } => self.acknowledge(),
            ServerMessage::Ping => self.send_message(&ClientMessage::Pong),
            ServerMessage::Pong => Ok(()),
            ServerMessage::Next { id, payload } => {
                let callback = self.callbacks.lock().get(&id).cloned();
                match callback {
                    Some(callback) => callback(&payload),
                    None => {
                        tracing::trace!(target: targets::CONNECTION, %id, "next for inactive subscription")
                    }
                }
                Ok(())
            }
            ServerMessage::Error { id, payload } => {
                let callback = self.callbacks.lock().remove(&id);
                tracing::debug!(target: targets::CONNECTION, %id, errors = payload.len(), "subscription failed");
                if let Some(callback) = callback {
                    callback(&serde_json::json!({ "errors": payload }));
                }
                Ok(())
            }
            ServerMessage::Complete { id } => {
                self.callbacks.lock().remove(&id);
                tracing::debug!(target: targets::CONNECTION, %id, "subscription completed by server");
                Ok(())
            }
        }
    }

    fn acknowledge(&self) -> Result<()> {
        let previous = {
            let mut state = self.handshake.lock();
            let previous = *state;
            if previous == HandshakeState::AwaitingAck {
                *state = HandshakeState::Acknowledged;
            }
            previous
        };

        match previous {
            HandshakeState::AwaitingAck => {
                tracing::debug!(target: targets::CONNECTION, "connection acknowledged");
                self.handshake_result.set(Ok(()));
                Ok(())
            }
            HandshakeState::Acknowledged => {
                let err = ProtocolError::DuplicateAck;
                if self.report_protocol_error(&err.to_string()) {
                    Ok(())
                } else {
                    Err(err.into())
                }
            }
            HandshakeState::Failed => {
                tracing::debug!(target: targets::CONNECTION, "ignoring ack after failed handshake");
                Ok(())
            }
        }
    }

    /// Fail a pending handshake. Returns `false` if none was pending.
    fn fail_handshake(&self, err: Error) -> bool {
        {
            let mut state = self.handshake.lock();
            if *state != HandshakeState::AwaitingAck {
                return false;
            }
            *state = HandshakeState::Failed;
        }
        tracing::warn!(target: targets::CONNECTION, error = %err, "handshake failed");
        self.handshake_result.set(Err(err));
        true
    }

    /// Hand a reason to the protocol-error observer, if one is installed.
    fn report_protocol_error(&self, reason: &str) -> bool {
        match self.on_protocol_error.get() {
            Some(observer) => {
                observer(reason);
                true
            }
            None => false,
        }
    }

    fn unsubscribe(&self, id: &str) {
        self.callbacks.lock().remove(id);
        if let Err(err) = self.send_message(&ClientMessage::Complete { id: id.to_string() }) {
            tracing::warn!(target: targets::CONNECTION, %id, error = %err, "failed to send complete");
        } else {
            tracing::debug!(target: targets::CONNECTION, %id, "unsubscribed");
        }
    }
}

/// A graphql-ws connection.
///
/// Construction blocks until the server acknowledges the connection or
/// the handshake fails. Dropping the connection stops the transport; it
/// does not send `complete` for subscriptions that are still live, and
/// releasing their handles afterwards does nothing.
///
/// # Example
///
/// ```ignore
/// use graphql_ws_client::{ConnectionConfig, SubscriptionConnection, Variables};
///
/// let connection = SubscriptionConnection::connect(
///     ConnectionConfig::new("ws://localhost:4000/graphql"),
/// )?;
///
/// let handle = connection.send_with("subscription { ticks }", Variables::new(), |payload| {
///     println!("tick: {payload}");
/// })?;
///
/// // Dropping the handle sends `complete`.
/// drop(handle);
/// ```
pub struct SubscriptionConnection {
    shared: Arc<Shared>,
    url: String,
}

impl SubscriptionConnection {
    /// Open a WebSocket connection and wait for the handshake.
    pub fn connect(config: ConnectionConfig) -> Result<Self> {
        let transport = WebSocketTransport::new(config.clone())?;
        Self::with_transport(Arc::new(transport), &config)
    }

    /// Connect to a bare `host:port/path` address over `ws://`.
    pub fn connect_address(address: impl AsRef<str>) -> Result<Self> {
        Self::connect(ConnectionConfig::from_address(address))
    }

    /// Run the protocol over an existing transport and wait for the
    /// handshake.
    ///
    /// Only the init payload and handshake timeout of `config` are used.
    pub fn with_transport(transport: Arc<dyn Transport>, config: &ConnectionConfig) -> Result<Self> {
        let shared = Arc::new(Shared {
            transport,
            init_payload: config.init_payload.clone(),
            handshake: Mutex::new(HandshakeState::AwaitingAck),
            handshake_result: OneShot::new(),
            next_id: AtomicU64::new(0),
            callbacks: Mutex::new(HashMap::new()),
            on_protocol_error: ObserverSlot::new(),
        });

        let weak: Weak<Shared> = Arc::downgrade(&shared);
        let handler: EventHandler = Arc::new(move |event| match weak.upgrade() {
            Some(shared) => shared.handle_event(event),
            None => Ok(()),
        });

        // Dropping `connection` on any error path below stops the transport.
        let connection = Self {
            shared,
            url: config.url.clone(),
        };
        connection.shared.transport.start(handler)?;

        match connection
            .shared
            .handshake_result
            .wait_for(config.handshake_timeout)
        {
            Some(Ok(())) => Ok(connection),
            Some(Err(err)) => Err(err),
            None => {
                connection.shared.fail_handshake(Error::Timeout);
                Err(Error::Timeout)
            }
        }
    }

    /// Start an operation.
    ///
    /// `on_receive`, if given, is registered under the new correlation id
    /// before the `subscribe` message is sent, and is invoked with every
    /// `next` payload for it. When the server reports an `error`, the
    /// callback is invoked one last time with `{"errors": [...]}`.
    ///
    /// The returned handle sends `complete` when released or dropped.
    pub fn send(
        &self,
        query: impl Into<String>,
        variables: Variables,
        on_receive: Option<ReplyCallback>,
    ) -> Result<SubscriptionHandle> {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed).to_string();

        if let Some(callback) = on_receive {
            self.shared.callbacks.lock().insert(id.clone(), callback);
        }

        let message = ClientMessage::Subscribe {
            id: id.clone(),
            payload: SubscribePayload {
                query: query.into(),
                variables,
            },
        };
        if let Err(err) = self.shared.send_message(&message) {
            self.shared.callbacks.lock().remove(&id);
            return Err(err);
        }
        tracing::debug!(target: targets::CONNECTION, %id, "subscribed");

        let weak = Arc::downgrade(&self.shared);
        let release_id = id.clone();
        Ok(SubscriptionHandle::with_id(id, move || {
            if let Some(shared) = weak.upgrade() {
                shared.unsubscribe(&release_id);
            }
        }))
    }

    /// Start an operation with a reply callback.
    pub fn send_with<F>(
        &self,
        query: impl Into<String>,
        variables: Variables,
        on_receive: F,
    ) -> Result<SubscriptionHandle>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.send(query, variables, Some(Arc::new(on_receive)))
    }

    /// Process one transport event.
    ///
    /// The handler installed at construction routes every event here; an
    /// `Err` is fatal for the session.
    pub fn dispatch(&self, event: TransportEvent) -> Result<()> {
        self.shared.handle_event(event)
    }

    /// Install the observer for non-fatal protocol anomalies.
    ///
    /// Without an observer, a duplicate `connection_ack` is fatal and
    /// transport errors after the handshake are only logged.
    pub fn set_protocol_error_observer<F>(&self, observer: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.shared.on_protocol_error.set(Arc::new(observer));
    }

    /// Remove the protocol-error observer.
    pub fn clear_protocol_error_observer(&self) {
        self.shared.on_protocol_error.clear();
    }

    /// Get the handshake state.
    pub fn handshake_state(&self) -> HandshakeState {
        *self.shared.handshake.lock()
    }

    /// Check whether the server acknowledged the connection.
    pub fn is_acknowledged(&self) -> bool {
        self.handshake_state() == HandshakeState::Acknowledged
    }

    /// Get the URL this connection was configured with.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Number of subscriptions with a registered callback.
    pub fn active_subscriptions(&self) -> usize {
        self.shared.callbacks.lock().len()
    }

    /// Stop the transport.
    pub fn close(self) {}
}

impl Drop for SubscriptionConnection {
    fn drop(&mut self) {
        self.shared.transport.stop();
    }
}

impl std::fmt::Debug for SubscriptionConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionConnection")
            .field("url", &self.url)
            .field("handshake", &self.handshake_state())
            .field("active_subscriptions", &self.active_subscriptions())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{ACK, MockTransport};
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn connect(transport: &Arc<MockTransport>) -> SubscriptionConnection {
        SubscriptionConnection::with_transport(
            transport.clone(),
            &ConnectionConfig::new("ws://mock"),
        )
        .unwrap()
    }

    fn recording() -> (ReplyCallback, Arc<Mutex<Vec<Value>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        let callback: ReplyCallback = Arc::new(move |payload: &Value| {
            sink.lock().push(payload.clone());
        });
        (callback, received)
    }

    #[test]
    fn test_handshake_success() {
        let transport = Arc::new(MockTransport::acking());
        let connection = connect(&transport);

        assert!(connection.is_acknowledged());
        assert_eq!(connection.handshake_state(), HandshakeState::Acknowledged);
        assert_eq!(connection.url(), "ws://mock");
        assert_eq!(transport.sent(), vec![json!({"type": "connection_init"})]);
    }

    #[test]
    fn test_dispatch_entry_point() {
        let transport = Arc::new(MockTransport::acking());
        let connection = connect(&transport);

        connection
            .dispatch(TransportEvent::Message(r#"{"type":"ping"}"#.into()))
            .unwrap();
        assert_eq!(transport.sent_of_type("pong").len(), 1);
        assert!(connection.dispatch(TransportEvent::Binary(vec![])).is_err());
    }

    #[test]
    fn test_handshake_sends_init_payload() {
        let transport = Arc::new(MockTransport::acking());
        let config = ConnectionConfig::new("ws://mock").bearer_auth("secret");
        let _connection = SubscriptionConnection::with_transport(transport.clone(), &config).unwrap();

        assert_eq!(
            transport.sent()[0],
            json!({"type": "connection_init", "payload": {"Authorization": "Bearer secret"}})
        );
    }

    #[test]
    fn test_handshake_transport_error() {
        let transport = Arc::new(MockTransport::scripted(vec![TransportEvent::Error(
            "connection refused".into(),
        )]));
        let result =
            SubscriptionConnection::with_transport(transport.clone(), &ConnectionConfig::new("ws://mock"));

        assert_eq!(
            result.unwrap_err(),
            Error::Transport("connection refused".into())
        );
        assert_eq!(transport.stop_calls(), 1);
    }

    #[test]
    fn test_handshake_fails_on_protocol_violation() {
        let transport = Arc::new(MockTransport::scripted(vec![
            TransportEvent::Open,
            TransportEvent::Message(r#"{"type":"bogus"}"#.into()),
        ]));
        let result =
            SubscriptionConnection::with_transport(transport.clone(), &ConnectionConfig::new("ws://mock"));

        assert_eq!(
            result.unwrap_err(),
            Error::Protocol(ProtocolError::UnknownMessageType("bogus".into()))
        );
    }

    #[test]
    fn test_handshake_fails_on_peer_close() {
        let transport = Arc::new(MockTransport::scripted(vec![
            TransportEvent::Open,
            TransportEvent::Close { code: Some(4403), reason: "Forbidden".into() },
        ]));
        let result =
            SubscriptionConnection::with_transport(transport.clone(), &ConnectionConfig::new("ws://mock"));

        assert_eq!(
            result.unwrap_err(),
            Error::Transport("connection closed before connection_ack (4403: Forbidden)".into())
        );
        assert_eq!(transport.stop_calls(), 1);
    }

    #[test]
    fn test_handshake_fails_on_stream_end() {
        let transport = Arc::new(MockTransport::scripted(vec![
            TransportEvent::Open,
            TransportEvent::Close { code: None, reason: String::new() },
        ]));
        let result =
            SubscriptionConnection::with_transport(transport, &ConnectionConfig::new("ws://mock"));

        assert_eq!(
            result.unwrap_err(),
            Error::Transport("connection closed before connection_ack".into())
        );
    }

    #[test]
    fn test_handshake_timeout() {
        let transport = Arc::new(MockTransport::scripted(vec![TransportEvent::Open]));
        let config = ConnectionConfig::new("ws://mock").handshake_timeout(Duration::from_millis(20));
        let result = SubscriptionConnection::with_transport(transport.clone(), &config);

        assert_eq!(result.unwrap_err(), Error::Timeout);
        assert_eq!(transport.stop_calls(), 1);
        // The handler is gone, so a late ack goes nowhere.
        assert!(!transport.has_handler());
    }

    #[test]
    fn test_ids_distinct_and_increasing() {
        let transport = Arc::new(MockTransport::acking());
        let connection = connect(&transport);

        let handles: Vec<_> = (0..5)
            .map(|_| connection.send("query{a}", Variables::new(), None).unwrap())
            .collect();

        let ids: Vec<&str> = handles.iter().map(|h| h.id().unwrap()).collect();
        assert_eq!(ids, vec!["0", "1", "2", "3", "4"]);

        let wire_ids: Vec<u64> = transport
            .sent_of_type("subscribe")
            .iter()
            .map(|m| m["id"].as_str().unwrap().parse().unwrap())
            .collect();
        assert!(wire_ids.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_concurrent_sends_get_unique_ids() {
        let transport = Arc::new(MockTransport::acking());
        let connection = Arc::new(connect(&transport));

        let threads: Vec<_> = (0..4)
            .map(|_| {
                let connection = connection.clone();
                std::thread::spawn(move || {
                    (0..25)
                        .map(|_| {
                            let handle = connection.send("query{a}", Variables::new(), None).unwrap();
                            let id = handle.id().unwrap().to_string();
                            handle.detach();
                            id
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let ids: HashSet<String> = threads
            .into_iter()
            .flat_map(|thread| thread.join().unwrap())
            .collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn test_subscribe_round_trip() {
        let transport = Arc::new(MockTransport::acking());
        let connection = connect(&transport);
        let (callback, received) = recording();

        let mut variables = Variables::new();
        variables.insert("x".into(), json!(1));
        let _handle = connection
            .send("subscription($x: Int) { echo(x: $x) }", variables, Some(callback))
            .unwrap();

        assert_eq!(
            transport.sent_of_type("subscribe"),
            vec![json!({
                "type": "subscribe",
                "id": "0",
                "payload": {"query": "subscription($x: Int) { echo(x: $x) }", "variables": {"x": 1}}
            })]
        );

        transport
            .deliver_json(json!({"type": "next", "id": "0", "payload": {"data": {"x": 1}}}))
            .unwrap();
        assert_eq!(*received.lock(), vec![json!({"data": {"x": 1}})]);
    }

    #[test]
    fn test_query_scenario() {
        let transport = Arc::new(MockTransport::acking());
        let connection = connect(&transport);
        let (callback, received) = recording();

        let mut handle = connection.send("query{a}", Variables::new(), Some(callback)).unwrap();
        transport
            .deliver_json(json!({"type": "next", "id": "0", "payload": {"data": {"a": 1}}}))
            .unwrap();
        assert_eq!(*received.lock(), vec![json!({"data": {"a": 1}})]);

        handle.release();
        assert_eq!(
            transport.sent_of_type("complete"),
            vec![json!({"type": "complete", "id": "0"})]
        );
        assert_eq!(connection.active_subscriptions(), 0);
    }

    #[test]
    fn test_next_for_unknown_id_is_ignored() {
        let transport = Arc::new(MockTransport::acking());
        let _connection = connect(&transport);

        let result =
            transport.deliver_json(json!({"type": "next", "id": "42", "payload": {"data": {}}}));
        assert!(result.is_ok());
    }

    #[test]
    fn test_next_after_release_is_ignored() {
        let transport = Arc::new(MockTransport::acking());
        let connection = connect(&transport);
        let (callback, received) = recording();

        let handle = connection.send("subscription{s}", Variables::new(), Some(callback)).unwrap();
        drop(handle);

        transport
            .deliver_json(json!({"type": "next", "id": "0", "payload": {"data": {}}}))
            .unwrap();
        assert!(received.lock().is_empty());
    }

    #[test]
    fn test_release_sends_exactly_one_complete() {
        let transport = Arc::new(MockTransport::acking());
        let connection = connect(&transport);

        let mut handle = connection.send("subscription{s}", Variables::new(), None).unwrap();
        handle.release();
        handle.release();
        drop(handle);

        assert_eq!(transport.sent_of_type("complete").len(), 1);
    }

    #[test]
    fn test_detach_keeps_subscription_alive() {
        let transport = Arc::new(MockTransport::acking());
        let connection = connect(&transport);
        let (callback, received) = recording();

        connection
            .send("subscription{s}", Variables::new(), Some(callback))
            .unwrap()
            .detach();

        transport
            .deliver_json(json!({"type": "next", "id": "0", "payload": {"data": {"s": 1}}}))
            .unwrap();
        assert_eq!(received.lock().len(), 1);
        assert!(transport.sent_of_type("complete").is_empty());
        assert_eq!(connection.active_subscriptions(), 1);
    }

    #[test]
    fn test_duplicate_ack_without_observer_is_fatal() {
        let transport = Arc::new(MockTransport::acking());
        let _connection = connect(&transport);

        assert_eq!(
            transport.deliver_text(ACK),
            Err(Error::Protocol(ProtocolError::DuplicateAck))
        );
    }

    #[test]
    fn test_duplicate_ack_goes_to_observer() {
        let transport = Arc::new(MockTransport::acking());
        let connection = connect(&transport);
        let reasons = Arc::new(Mutex::new(Vec::new()));

        let sink = reasons.clone();
        connection.set_protocol_error_observer(move |reason| sink.lock().push(reason.to_string()));

        assert!(transport.deliver_text(ACK).is_ok());
        assert_eq!(
            *reasons.lock(),
            vec!["Received graphql-ws connection_ack twice".to_string()]
        );
        assert!(connection.is_acknowledged());
    }

    #[test]
    fn test_transport_error_after_handshake_goes_to_observer() {
        let transport = Arc::new(MockTransport::acking());
        let connection = connect(&transport);
        let reasons = Arc::new(Mutex::new(Vec::new()));

        // Without an observer the error is only logged.
        assert!(transport.deliver(TransportEvent::Error("reset".into())).is_ok());

        let sink = reasons.clone();
        connection.set_protocol_error_observer(move |reason| sink.lock().push(reason.to_string()));
        assert!(transport.deliver(TransportEvent::Error("reset".into())).is_ok());
        assert_eq!(*reasons.lock(), vec!["reset".to_string()]);

        connection.clear_protocol_error_observer();
        assert!(transport.deliver(TransportEvent::Error("reset".into())).is_ok());
        assert_eq!(reasons.lock().len(), 1);
    }

    #[test]
    fn test_ping_is_answered_with_pong() {
        let transport = Arc::new(MockTransport::acking());
        let _connection = connect(&transport);

        transport.deliver_json(json!({"type": "ping"})).unwrap();
        assert_eq!(transport.sent_of_type("pong"), vec![json!({"type": "pong"})]);
    }

    #[test]
    fn test_protocol_pong_is_ignored() {
        let transport = Arc::new(MockTransport::acking());
        let _connection = connect(&transport);

        transport.deliver_json(json!({"type": "pong"})).unwrap();
        assert_eq!(transport.sent().len(), 1);
    }

    #[test]
    fn test_unknown_message_type_is_fatal() {
        let transport = Arc::new(MockTransport::acking());
        let connection = connect(&transport);

        let result = transport.deliver_json(json!({"type": "data", "id": "0"}));
        assert_eq!(
            result,
            Err(Error::Protocol(ProtocolError::UnknownMessageType("data".into())))
        );
        // The handshake already succeeded and stays that way.
        assert!(connection.is_acknowledged());
    }

    #[test]
    fn test_malformed_messages_are_fatal() {
        let transport = Arc::new(MockTransport::acking());
        let _connection = connect(&transport);

        assert!(transport.deliver_text("{not json").unwrap_err().is_protocol());
        assert_eq!(
            transport.deliver_json(json!({"type": "next", "id": "0"})),
            Err(Error::Protocol(ProtocolError::missing_field("next", "payload")))
        );
    }

    #[test]
    fn test_unsupported_transport_frames() {
        let transport = Arc::new(MockTransport::acking());
        let connection = connect(&transport);

        assert!(transport.deliver(TransportEvent::Ping).is_ok());
        assert!(
            transport
                .deliver(TransportEvent::Close { code: Some(1000), reason: String::new() })
                .is_ok()
        );
        assert!(connection.is_acknowledged());
        assert_eq!(
            transport.deliver(TransportEvent::Pong),
            Err(Error::Protocol(ProtocolError::UnsupportedFrame("pong")))
        );
        assert_eq!(
            transport.deliver(TransportEvent::Fragment),
            Err(Error::Protocol(ProtocolError::UnsupportedFrame("fragment")))
        );
        assert_eq!(
            transport.deliver(TransportEvent::Binary(vec![1])),
            Err(Error::Protocol(ProtocolError::UnsupportedFrame("binary")))
        );
    }

    #[test]
    fn test_error_message_terminates_subscription() {
        let transport = Arc::new(MockTransport::acking());
        let connection = connect(&transport);
        let (callback, received) = recording();

        let handle = connection.send("query{a}", Variables::new(), Some(callback)).unwrap();
        transport
            .deliver_json(json!({"type": "error", "id": "0", "payload": [{"message": "boom"}]}))
            .unwrap();
        transport
            .deliver_json(json!({"type": "next", "id": "0", "payload": {"data": {}}}))
            .unwrap();

        assert_eq!(
            *received.lock(),
            vec![json!({"errors": [{"message": "boom"}]})]
        );
        assert_eq!(connection.active_subscriptions(), 0);
        handle.detach();
    }

    #[test]
    fn test_complete_removes_subscription() {
        let transport = Arc::new(MockTransport::acking());
        let connection = connect(&transport);
        let (callback, received) = recording();

        let _handle = connection.send("subscription{s}", Variables::new(), Some(callback)).unwrap();
        assert_eq!(connection.active_subscriptions(), 1);

        transport.deliver_json(json!({"type": "complete", "id": "0"})).unwrap();
        transport
            .deliver_json(json!({"type": "next", "id": "0", "payload": {"data": {}}}))
            .unwrap();

        assert_eq!(connection.active_subscriptions(), 0);
        assert!(received.lock().is_empty());
    }

    #[test]
    fn test_callback_may_send_reentrantly() {
        let transport = Arc::new(MockTransport::acking());
        let connection = Arc::new(connect(&transport));
        let nested = Arc::new(AtomicUsize::new(0));

        let weak = Arc::downgrade(&connection);
        let counter = nested.clone();
        connection
            .send_with("subscription{s}", Variables::new(), move |_| {
                if let Some(connection) = weak.upgrade() {
                    let handle = connection.send("query{b}", Variables::new(), None).unwrap();
                    handle.detach();
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            })
            .unwrap()
            .detach();

        transport
            .deliver_json(json!({"type": "next", "id": "0", "payload": {"data": {}}}))
            .unwrap();

        assert_eq!(nested.load(Ordering::SeqCst), 1);
        assert_eq!(transport.sent_of_type("subscribe").len(), 2);
    }

    #[test]
    fn test_failed_send_rolls_back_registration() {
        let transport = Arc::new(MockTransport::acking());
        let connection = connect(&transport);
        let (callback, _received) = recording();

        transport.fail_sends(true);
        let result = connection.send("query{a}", Variables::new(), Some(callback));

        assert_eq!(result.unwrap_err(), Error::Transport("send failed".into()));
        assert_eq!(connection.active_subscriptions(), 0);
    }

    #[test]
    fn test_release_after_connection_dropped_is_noop() {
        let transport = Arc::new(MockTransport::acking());
        let connection = connect(&transport);
        let handle = connection.send("subscription{s}", Variables::new(), None).unwrap();

        drop(connection);
        assert_eq!(transport.stop_calls(), 1);
        drop(handle);

        // Teardown does not complete live subscriptions either.
        assert!(transport.sent_of_type("complete").is_empty());
    }
}
