//! Single-callback observer slots.
//!
//! An [`ObserverSlot`] holds at most one callback. Readers clone the
//! callback out of the slot and invoke it after the lock is released, so an
//! observer may freely replace or clear the slot it was called from.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// A replaceable slot for one observer callback.
///
/// `F` is normally an unsized closure type such as
/// `dyn Fn(&str) + Send + Sync`.
pub struct ObserverSlot<F: ?Sized> {
    observer: Mutex<Option<Arc<F>>>,
}

impl<F: ?Sized> ObserverSlot<F> {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self {
            observer: Mutex::new(None),
        }
    }

    /// Install an observer, replacing any previous one.
    pub fn set(&self, observer: Arc<F>) {
        *self.observer.lock() = Some(observer);
    }

    /// Remove the current observer, returning it.
    pub fn clear(&self) -> Option<Arc<F>> {
        self.observer.lock().take()
    }

    /// Get a clone of the current observer.
    ///
    /// The lock is released before this returns; call the observer through
    /// the returned `Arc`.
    pub fn get(&self) -> Option<Arc<F>> {
        self.observer.lock().clone()
    }

    /// Check whether an observer is installed.
    pub fn is_set(&self) -> bool {
        self.observer.lock().is_some()
    }
}

impl<F: ?Sized> Default for ObserverSlot<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ?Sized> fmt::Debug for ObserverSlot<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverSlot")
            .field("is_set", &self.is_set())
            .finish()
    }
}
