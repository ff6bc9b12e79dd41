//! A Tokio runtime that runs on its own dedicated thread.
//!
//! [`WorkerRuntime`] lets blocking, synchronous callers own asynchronous
//! I/O: futures are spawned onto a current-thread runtime driven by a
//! background thread, so the caller's thread is free to block on the
//! results. Everything spawned on one worker runs on that single thread,
//! in order.

use std::future::Future;
use std::thread::{JoinHandle, ThreadId};

use parking_lot::Mutex;
use tokio::runtime::{Builder, Handle};
use tokio::sync::oneshot;

use crate::logging::targets;

/// Errors that can occur when starting a worker runtime.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    /// Failed to spawn the thread or build the runtime on it.
    #[error("Failed to create worker runtime: {0}")]
    CreationFailed(String),
}

/// A current-thread Tokio runtime on a dedicated, named thread.
///
/// The runtime stops when [`shutdown`](Self::shutdown) is called or the
/// worker is dropped. Tasks still pending at that point are dropped without
/// being polled again.
pub struct WorkerRuntime {
    handle: Handle,
    thread_id: ThreadId,
    thread_handle: Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl WorkerRuntime {
    /// Start a worker thread with the given name.
    ///
    /// Blocks until the runtime on the new thread is ready to accept tasks.
    pub fn new(thread_name: impl Into<String>) -> Result<Self, RuntimeError> {
        let thread_name = thread_name.into();

        // Channel to send the handle back from the spawned thread
        let (handle_tx, handle_rx) = std::sync::mpsc::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let thread_handle = std::thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                let runtime = match Builder::new_current_thread().enable_all().build() {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = handle_tx.send(Err(e.to_string()));
                        return;
                    }
                };

                let _ = handle_tx.send(Ok(runtime.handle().clone()));

                runtime.block_on(async {
                    let _ = shutdown_rx.await;
                });
            })
            .map_err(|e| RuntimeError::CreationFailed(e.to_string()))?;

        let thread_id = thread_handle.thread().id();

        let handle = handle_rx
            .recv()
            .map_err(|_| RuntimeError::CreationFailed("Worker thread exited during startup".into()))?
            .map_err(RuntimeError::CreationFailed)?;

        tracing::debug!(target: targets::RUNTIME, thread = %thread_name, "worker runtime started");

        Ok(Self {
            handle,
            thread_id,
            thread_handle: Mutex::new(Some(thread_handle)),
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
        })
    }

    /// Get a handle to the runtime.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Spawn a future onto the worker thread.
    pub fn spawn<F>(&self, future: F) -> tokio::task::JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }

    /// Check whether the calling thread is this runtime's worker thread.
    pub fn is_worker_thread(&self) -> bool {
        std::thread::current().id() == self.thread_id
    }

    /// Check whether the runtime is still running.
    pub fn is_running(&self) -> bool {
        self.shutdown_tx.lock().is_some()
    }

    /// Stop the runtime.
    ///
    /// Joins the worker thread unless called from the worker itself, in
    /// which case the thread winds down once the current task yields.
    /// Calling this more than once is a no-op.
    pub fn shutdown(&self) {
        let Some(shutdown_tx) = self.shutdown_tx.lock().take() else {
            return;
        };
        let _ = shutdown_tx.send(());

        if self.is_worker_thread() {
            tracing::trace!(target: targets::RUNTIME, "shutdown requested from worker thread");
            return;
        }

        if let Some(handle) = self.thread_handle.lock().take() {
            let _ = handle.join();
        }
        tracing::debug!(target: targets::RUNTIME, "worker runtime stopped");
    }
}

impl Drop for WorkerRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for WorkerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerRuntime")
            .field("thread_id", &self.thread_id)
            .field("is_running", &self.is_running())
            .finish()
    }
}
