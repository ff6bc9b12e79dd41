//! Client for the graphql-ws protocol.
//!
//! This crate speaks the `graphql-transport-ws` WebSocket subprotocol:
//!
//! - **Connection**: [`SubscriptionConnection`] performs the
//!   `connection_init` / `connection_ack` handshake and multiplexes
//!   operations over one socket, routing each `next` payload to the
//!   callback registered for its id
//! - **Handles**: every operation returns a [`SubscriptionHandle`]; dropping
//!   it sends `complete`, [`detach`](SubscriptionHandle::detach) keeps the
//!   subscription running
//! - **Client**: [`GraphQLWsClient`] splits payloads into data and GraphQL
//!   errors and offers a blocking [`execute`](GraphQLWsClient::execute)
//!
//! # Subscriptions
//!
//! ```ignore
//! use graphql_ws_client::{ConnectionConfig, GraphQLWsClient, Variables};
//!
//! let client = GraphQLWsClient::connect(
//!     ConnectionConfig::new("ws://localhost:4000/graphql").bearer_auth("token"),
//! )?;
//!
//! let handle = client.subscribe("subscription { messages { text } }", Variables::new(), |reply| {
//!     match reply {
//!         Ok(data) => println!("message: {data}"),
//!         Err(e) => eprintln!("subscription failed: {e}"),
//!     }
//! })?;
//!
//! // ... later: sends `complete`
//! drop(handle);
//! ```
//!
//! # Blocking Queries
//!
//! ```ignore
//! let mut variables = Variables::new();
//! variables.insert("id".into(), serde_json::json!(42));
//!
//! match client.execute("query($id: ID!) { user(id: $id) { name } }", variables)? {
//!     Some(data) => println!("{data}"),
//!     None => println!("errors went to the query-error observer"),
//! }
//! ```
//!
//! # Error Observers
//!
//! GraphQL errors can be routed to one place instead of every caller:
//!
//! ```ignore
//! client.set_query_error_observer(|query, _variables, errors| {
//!     tracing::warn!(%query, first = %errors[0], "query failed");
//! });
//! ```
//!
//! Protocol anomalies that are survivable (a repeated `connection_ack`, a
//! transport error after the handshake) go to the protocol-error observer.
//!
//! # Threading
//!
//! The WebSocket transport runs on its own worker thread and callbacks are
//! invoked there. Sending and releasing handles work from any thread,
//! including from inside callbacks.

mod client;
mod config;
mod connection;
mod error;
mod handle;
pub mod protocol;
mod response;
pub mod transport;

pub use client::{GraphQLWsClient, QueryErrorObserver};
pub use config::ConnectionConfig;
pub use connection::{HandshakeState, ProtocolErrorObserver, ReplyCallback, SubscriptionConnection};
pub use error::{Error, ProtocolError, Result};
pub use handle::SubscriptionHandle;
pub use protocol::{SUBPROTOCOL, Variables};
pub use response::{GraphQLError, GraphQLLocation, PathSegment, Reply, first_error};
pub use transport::{EventHandler, Transport, TransportEvent, TransportState, WebSocketTransport};
