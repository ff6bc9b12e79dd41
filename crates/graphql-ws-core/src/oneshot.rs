//! Write-once cells for bridging callbacks to blocked threads.

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

enum CellState<T> {
    Empty,
    Ready(T),
    Taken,
}

/// A write-once, wait-until-written cell.
///
/// The first call to [`set`](Self::set) stores the value and wakes any
/// waiter; later calls are rejected. A waiter takes the value out of the
/// cell, so it is delivered to exactly one [`wait`](Self::wait) call.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use graphql_ws_core::OneShot;
///
/// let cell = Arc::new(OneShot::new());
/// let writer = cell.clone();
/// std::thread::spawn(move || {
///     writer.set(42);
/// });
///
/// assert_eq!(cell.wait(), Some(42));
/// ```
pub struct OneShot<T> {
    state: Mutex<CellState<T>>,
    condvar: Condvar,
}

impl<T> OneShot<T> {
    /// Create an empty cell.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CellState::Empty),
            condvar: Condvar::new(),
        }
    }

    /// Store a value.
    ///
    /// Returns `false` if the cell was already written; the value is dropped.
    pub fn set(&self, value: T) -> bool {
        let mut state = self.state.lock();
        if !matches!(*state, CellState::Empty) {
            return false;
        }
        *state = CellState::Ready(value);
        self.condvar.notify_all();
        true
    }

    /// Check whether the cell has been written.
    pub fn is_set(&self) -> bool {
        !matches!(*self.state.lock(), CellState::Empty)
    }

    /// Block until the cell is written and take the value.
    ///
    /// Returns `None` if another waiter already took it.
    pub fn wait(&self) -> Option<T> {
        let mut state = self.state.lock();
        while matches!(*state, CellState::Empty) {
            self.condvar.wait(&mut state);
        }
        Self::take_ready(&mut state)
    }

    /// Block until the cell is written or the timeout elapses.
    ///
    /// Returns `None` on timeout or if another waiter already took the value.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while matches!(*state, CellState::Empty) {
            if self.condvar.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        Self::take_ready(&mut state)
    }

    /// Block with an optional timeout; `None` waits forever.
    pub fn wait_for(&self, timeout: Option<Duration>) -> Option<T> {
        match timeout {
            Some(timeout) => self.wait_timeout(timeout),
            None => self.wait(),
        }
    }

    fn take_ready(state: &mut CellState<T>) -> Option<T> {
        match std::mem::replace(state, CellState::Taken) {
            CellState::Ready(value) => Some(value),
            other => {
                *state = other;
                None
            }
        }
    }
}

impl<T> Default for OneShot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for OneShot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match *self.state.lock() {
            CellState::Empty => "empty",
            CellState::Ready(_) => "ready",
            CellState::Taken => "taken",
        };
        f.debug_struct("OneShot").field("state", &state).finish()
    }
}
