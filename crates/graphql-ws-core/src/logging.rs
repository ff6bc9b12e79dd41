//! Tracing targets for the graphql-ws crates.
//!
//! The crates use the `tracing` crate for instrumentation. To see logs,
//! install a subscriber in your application:
//!
//! ```ignore
//! tracing_subscriber::fmt()
//!     .with_env_filter("graphql_ws=debug")
//!     .init();
//! ```

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Protocol engine: handshake, dispatch, subscription lifecycle.
    pub const CONNECTION: &str = "graphql_ws::connection";
    /// WebSocket transport: connect, frames, shutdown.
    pub const TRANSPORT: &str = "graphql_ws::transport";
    /// Query façade: error diversion and blocking requests.
    pub const CLIENT: &str = "graphql_ws::client";
    /// Worker runtime lifecycle.
    pub const RUNTIME: &str = "graphql_ws::runtime";
}
