//! WebSocket transport over `tokio-tungstenite`.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use graphql_ws_core::logging::targets;
use graphql_ws_core::{OneShot, WorkerRuntime};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use super::{EventHandler, Transport, TransportEvent, TransportState};
use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::protocol::SUBPROTOCOL;

/// How long `stop` waits for the close frame to be flushed.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Command sent to the connection task.
enum Command {
    SendText(String),
    Close,
}

/// A WebSocket transport speaking the `graphql-transport-ws` subprotocol.
///
/// The connection is driven by a dedicated worker thread; all
/// [`TransportEvent`]s are delivered on that thread, in order.
/// [`send_text`](Transport::send_text) may be called from any thread.
///
/// # Example
///
/// ```ignore
/// let transport = WebSocketTransport::new(ConnectionConfig::new("ws://localhost:4000/graphql"))?;
/// transport.start(Arc::new(|event| {
///     println!("{event:?}");
///     Ok(())
/// }))?;
/// ```
pub struct WebSocketTransport {
    config: ConnectionConfig,
    runtime: WorkerRuntime,
    command_tx: Arc<Mutex<Option<mpsc::UnboundedSender<Command>>>>,
    state: Arc<Mutex<TransportState>>,
    finished: Arc<OneShot<()>>,
}

impl WebSocketTransport {
    /// Create a transport for the configured URL.
    ///
    /// The URL and headers are validated here; the connection is opened by
    /// [`start`](Transport::start).
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        Self::build_request(&config)?;
        let runtime = WorkerRuntime::new("graphql-ws-transport")?;

        Ok(Self {
            config,
            runtime,
            command_tx: Arc::new(Mutex::new(None)),
            state: Arc::new(Mutex::new(TransportState::Disconnected)),
            finished: Arc::new(OneShot::new()),
        })
    }

    /// Get the current connection state.
    pub fn state(&self) -> TransportState {
        *self.state.lock()
    }

    /// Check if the transport is connected.
    pub fn is_connected(&self) -> bool {
        self.state() == TransportState::Connected
    }

    /// Get the URL this transport connects to.
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Build the WebSocket request with the subprotocol and custom headers.
    fn build_request(config: &ConnectionConfig) -> Result<Request> {
        let url = config.parsed_url()?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| Error::InvalidUrl(e.to_string()))?;

        let headers = request.headers_mut();
        headers.insert(
            http::header::SEC_WEBSOCKET_PROTOCOL,
            http::header::HeaderValue::from_static(SUBPROTOCOL),
        );
        for (name, value) in &config.headers {
            let header_name = http::header::HeaderName::try_from(name.as_str())?;
            let header_value = http::header::HeaderValue::try_from(value.as_str())?;
            headers.insert(header_name, header_value);
        }

        Ok(request)
    }

    async fn run(
        request: Request,
        handler: EventHandler,
        command_tx: Arc<Mutex<Option<mpsc::UnboundedSender<Command>>>>,
        state: Arc<Mutex<TransportState>>,
    ) {
        let ws_stream = match tokio_tungstenite::connect_async(request).await {
            Ok((ws_stream, _response)) => ws_stream,
            Err(e) => {
                tracing::warn!(target: targets::TRANSPORT, error = %e, "connect failed");
                Self::mark_disconnected(&state);
                let _ = handler(TransportEvent::Error(e.to_string()));
                return;
            }
        };

        // The command channel must exist before `Open` is delivered: the
        // handler answers `Open` by sending `connection_init`.
        if !Self::mark_connected(&state) {
            tracing::debug!(target: targets::TRANSPORT, "stopped while connecting");
            return;
        }
        let (tx, mut rx) = mpsc::unbounded_channel::<Command>();
        *command_tx.lock() = Some(tx);
        tracing::debug!(target: targets::TRANSPORT, "connected");

        let (mut write, mut read) = ws_stream.split();
        let mut fatal = handler(TransportEvent::Open).err();

        while fatal.is_none() {
            tokio::select! {
                cmd = rx.recv() => {
                    match cmd {
                        Some(Command::SendText(text)) => {
                            if let Err(e) = write.send(Message::Text(text.into())).await {
                                let _ = handler(TransportEvent::Error(e.to_string()));
                                break;
                            }
                        }
                        Some(Command::Close) | None => {
                            let frame = CloseFrame {
                                code: CloseCode::Normal,
                                reason: "".into(),
                            };
                            let _ = write.send(Message::Close(Some(frame))).await;
                            break;
                        }
                    }
                }

                msg = read.next() => {
                    let event = match msg {
                        Some(Ok(Message::Text(text))) => TransportEvent::Message(text.to_string()),
                        Some(Ok(Message::Binary(data))) => TransportEvent::Binary(data.to_vec()),
                        // Pong is sent automatically by tungstenite
                        Some(Ok(Message::Ping(_))) => TransportEvent::Ping,
                        Some(Ok(Message::Pong(_))) => TransportEvent::Pong,
                        Some(Ok(Message::Frame(_))) => TransportEvent::Fragment,
                        Some(Ok(Message::Close(frame))) => {
                            let _ = handler(TransportEvent::Close {
                                code: frame.as_ref().map(|frame| u16::from(frame.code)),
                                reason: frame.map(|frame| frame.reason.to_string()).unwrap_or_default(),
                            });
                            break;
                        }
                        None => {
                            let _ = handler(TransportEvent::Close { code: None, reason: String::new() });
                            break;
                        }
                        Some(Err(e)) => {
                            let _ = handler(TransportEvent::Error(e.to_string()));
                            break;
                        }
                    };
                    fatal = handler(event).err();
                }
            }
        }

        if let Some(err) = fatal {
            tracing::error!(target: targets::TRANSPORT, error = %err, "closing connection after fatal error");
            let frame = CloseFrame {
                code: CloseCode::Protocol,
                reason: "protocol violation".into(),
            };
            let _ = write.send(Message::Close(Some(frame))).await;
        }

        *command_tx.lock() = None;
        Self::mark_disconnected(&state);
        tracing::debug!(target: targets::TRANSPORT, "disconnected");
    }

    /// Move from `Connecting` to `Connected`. Returns `false` if the
    /// transport was stopped in the meantime.
    fn mark_connected(state: &Mutex<TransportState>) -> bool {
        let mut state = state.lock();
        if *state != TransportState::Connecting {
            return false;
        }
        *state = TransportState::Connected;
        true
    }

    /// Move to `Disconnected` unless the transport was stopped.
    fn mark_disconnected(state: &Mutex<TransportState>) {
        let mut state = state.lock();
        if *state != TransportState::Stopped {
            *state = TransportState::Disconnected;
        }
    }
}

impl Transport for WebSocketTransport {
    fn start(&self, handler: EventHandler) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state != TransportState::Disconnected {
                return Err(Error::Transport("Transport already started".into()));
            }
            *state = TransportState::Connecting;
        }

        let request = Self::build_request(&self.config)?;
        let command_tx = self.command_tx.clone();
        let state = self.state.clone();
        let finished = self.finished.clone();

        tracing::debug!(target: targets::TRANSPORT, url = %self.config.url, "connecting");
        self.runtime.spawn(async move {
            Self::run(request, handler, command_tx, state).await;
            finished.set(());
        });

        Ok(())
    }

    fn send_text(&self, text: String) -> Result<()> {
        let tx = self.command_tx.lock();
        match tx.as_ref() {
            Some(tx) => tx
                .send(Command::SendText(text))
                .map_err(|_| Error::NotConnected),
            None => Err(Error::NotConnected),
        }
    }

    fn stop(&self) {
        {
            let mut state = self.state.lock();
            if *state == TransportState::Stopped {
                return;
            }
            *state = TransportState::Stopped;
        }

        let close_sent = self
            .command_tx
            .lock()
            .as_ref()
            .is_some_and(|tx| tx.send(Command::Close).is_ok());

        if close_sent && !self.runtime.is_worker_thread() {
            self.finished.wait_timeout(CLOSE_GRACE);
        }

        // Dropping the connection task releases the event handler.
        self.runtime.shutdown();
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("url", &self.config.url)
            .field("state", &self.state())
            .finish()
    }
}
