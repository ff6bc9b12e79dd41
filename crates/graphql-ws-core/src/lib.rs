//! Core primitives shared by the graphql-ws client crates.
//!
//! This crate contains the small concurrency building blocks the protocol
//! engine is assembled from:
//!
//! - [`ObserverSlot`] - A single replaceable callback, invoked outside its lock
//! - [`OneShot`] - A write-once cell that a thread can block on until it is filled
//! - [`WorkerRuntime`] - A current-thread Tokio runtime on a dedicated thread
//! - [`logging`] - Tracing target names used across the workspace
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use graphql_ws_core::{ObserverSlot, OneShot};
//!
//! let cell = Arc::new(OneShot::new());
//! let observer: ObserverSlot<dyn Fn(&str) + Send + Sync> = ObserverSlot::new();
//!
//! let writer = cell.clone();
//! observer.set(Arc::new(move |reason: &str| {
//!     writer.set(reason.to_string());
//! }));
//!
//! if let Some(callback) = observer.get() {
//!     callback("connection lost");
//! }
//!
//! assert_eq!(cell.wait(), Some("connection lost".to_string()));
//! ```

pub mod logging;
mod observer;
mod oneshot;
mod runtime;

pub use observer::ObserverSlot;
pub use oneshot::OneShot;
pub use runtime::{RuntimeError, WorkerRuntime};
