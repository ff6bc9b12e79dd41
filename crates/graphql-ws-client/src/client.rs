//! Query-level API over a graphql-ws connection.
//!
//! [`GraphQLWsClient`] turns raw `next` payloads into `data` values or
//! GraphQL errors, and offers a blocking [`execute`](GraphQLWsClient::execute)
//! for single-result operations.

use std::sync::Arc;
use std::time::Duration;

use graphql_ws_core::logging::targets;
use graphql_ws_core::{ObserverSlot, OneShot};
use serde_json::Value;

use crate::config::ConnectionConfig;
use crate::connection::{ReplyCallback, SubscriptionConnection};
use crate::error::{Error, Result};
use crate::handle::SubscriptionHandle;
use crate::protocol::Variables;
use crate::response::{GraphQLError, Reply, first_error};
use crate::transport::Transport;

/// Observer for GraphQL errors, called with the query, its variables and
/// the reported errors.
pub type QueryErrorObserver = dyn Fn(&str, &Variables, &[GraphQLError]) + Send + Sync;

/// What a reply turned into after error routing.
enum Outcome {
    Data(Value),
    /// The errors went to the query-error observer.
    Diverted,
    Failed(Error),
}

/// A GraphQL client over the graphql-ws protocol.
///
/// # Error routing
///
/// When a reply carries `errors`, the installed query-error observer
/// receives them and the caller's callback is not invoked. Without an
/// observer the callback gets [`Error::Query`] with the first error's
/// message.
///
/// # Example
///
/// ```ignore
/// use graphql_ws_client::{ConnectionConfig, GraphQLWsClient, Variables};
///
/// let client = GraphQLWsClient::connect(ConnectionConfig::new("ws://localhost:4000/graphql"))?;
///
/// let data = client.execute("query { viewer { name } }", Variables::new())?;
///
/// let _handle = client.subscribe("subscription { ticks }", Variables::new(), |reply| {
///     match reply {
///         Ok(data) => println!("tick: {data}"),
///         Err(e) => eprintln!("failed: {e}"),
///     }
/// })?;
/// ```
pub struct GraphQLWsClient {
    connection: SubscriptionConnection,
    on_query_error: Arc<ObserverSlot<QueryErrorObserver>>,
    request_timeout: Option<Duration>,
}

impl GraphQLWsClient {
    /// Open a WebSocket connection and wait for the handshake.
    pub fn connect(config: ConnectionConfig) -> Result<Self> {
        let request_timeout = config.request_timeout;
        let connection = SubscriptionConnection::connect(config)?;
        Ok(Self::from_connection(connection, request_timeout))
    }

    /// Connect to a bare `host:port/path` address over `ws://`.
    pub fn connect_address(address: impl AsRef<str>) -> Result<Self> {
        Self::connect(ConnectionConfig::from_address(address))
    }

    /// Run the client over an existing transport.
    pub fn with_transport(transport: Arc<dyn Transport>, config: &ConnectionConfig) -> Result<Self> {
        let connection = SubscriptionConnection::with_transport(transport, config)?;
        Ok(Self::from_connection(connection, config.request_timeout))
    }

    /// Wrap an established connection.
    pub fn from_connection(connection: SubscriptionConnection, request_timeout: Option<Duration>) -> Self {
        Self {
            connection,
            on_query_error: Arc::new(ObserverSlot::new()),
            request_timeout,
        }
    }

    /// Get the underlying connection.
    pub fn connection(&self) -> &SubscriptionConnection {
        &self.connection
    }

    /// Start an operation and receive each of its results.
    ///
    /// `on_reply` gets `Ok(data)` for every result without errors. Dropping
    /// the returned handle unsubscribes.
    pub fn subscribe<F>(
        &self,
        query: impl Into<String>,
        variables: Variables,
        on_reply: F,
    ) -> Result<SubscriptionHandle>
    where
        F: Fn(Result<Value>) + Send + Sync + 'static,
    {
        self.register(query.into(), variables, move |outcome| match outcome {
            Outcome::Data(data) => on_reply(Ok(data)),
            Outcome::Diverted => {}
            Outcome::Failed(err) => on_reply(Err(err)),
        })
    }

    /// Run an operation and block until its first result.
    ///
    /// Returns `Ok(None)` when the result carried errors and the query-error
    /// observer took them. The operation is completed before returning.
    ///
    /// This must not be called from a reply callback: replies are dispatched
    /// on the thread such a callback runs on.
    pub fn execute(&self, query: impl Into<String>, variables: Variables) -> Result<Option<Value>> {
        let reply = Arc::new(OneShot::<Result<Option<Value>>>::new());
        let sink = reply.clone();
        let handle = self.register(query.into(), variables, move |outcome| {
            sink.set(match outcome {
                Outcome::Data(data) => Ok(Some(data)),
                Outcome::Diverted => Ok(None),
                Outcome::Failed(err) => Err(err),
            });
        })?;

        let result = reply.wait_for(self.request_timeout);
        drop(handle);

        result.unwrap_or_else(|| {
            tracing::warn!(target: targets::CLIENT, "request timed out");
            Err(Error::Timeout)
        })
    }

    fn register<F>(&self, query: String, variables: Variables, on_outcome: F) -> Result<SubscriptionHandle>
    where
        F: Fn(Outcome) + Send + Sync + 'static,
    {
        let observer_slot = self.on_query_error.clone();
        let captured_query = query.clone();
        let captured_variables = variables.clone();

        let callback: ReplyCallback = Arc::new(move |payload: &Value| {
            let outcome = match Reply::from_payload(payload) {
                Ok(Reply::Data(data)) => Outcome::Data(data),
                Ok(Reply::Errors(errors)) => match observer_slot.get() {
                    Some(observer) => {
                        tracing::debug!(target: targets::CLIENT, errors = errors.len(), "query errors diverted to observer");
                        observer(&captured_query, &captured_variables, &errors);
                        Outcome::Diverted
                    }
                    None => Outcome::Failed(first_error(&errors)),
                },
                Err(err) => Outcome::Failed(err),
            };
            on_outcome(outcome);
        });

        self.connection.send(query, variables, Some(callback))
    }

    /// Install the observer that takes GraphQL errors instead of callers.
    pub fn set_query_error_observer<F>(&self, observer: F)
    where
        F: Fn(&str, &Variables, &[GraphQLError]) + Send + Sync + 'static,
    {
        self.on_query_error.set(Arc::new(observer));
    }

    /// Remove the query-error observer.
    pub fn clear_query_error_observer(&self) {
        self.on_query_error.clear();
    }

    /// Install the observer for non-fatal protocol anomalies.
    pub fn set_protocol_error_observer<F>(&self, observer: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.connection.set_protocol_error_observer(observer);
    }

    /// Remove the protocol-error observer.
    pub fn clear_protocol_error_observer(&self) {
        self.connection.clear_protocol_error_observer();
    }
}

impl std::fmt::Debug for GraphQLWsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphQLWsClient")
            .field("connection", &self.connection)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}
