//! Ownership tokens for live subscriptions.

use std::fmt;

type ReleaseAction = Box<dyn FnOnce() + Send>;

enum HandleState {
    Armed(ReleaseAction),
    Released,
}

/// The right to stop one subscription, exactly once.
///
/// Dropping an armed handle releases it, which for handles returned by
/// [`SubscriptionConnection::send`](crate::SubscriptionConnection::send)
/// sends `complete` for the subscription and removes its callback.
/// [`detach`](Self::detach) disarms the handle so the subscription outlives
/// it.
///
/// Handles are movable but not cloneable. A default handle is empty and
/// releasing it does nothing.
///
/// # Example
///
/// ```ignore
/// let handle = connection.send("subscription { ticks }", Variables::new(), Some(on_tick))?;
///
/// // Keep receiving after `handle` goes out of scope.
/// handle.detach();
/// ```
pub struct SubscriptionHandle {
    id: Option<String>,
    state: HandleState,
}

impl SubscriptionHandle {
    /// Create an armed handle that runs `action` on release.
    pub fn new<F>(action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            id: None,
            state: HandleState::Armed(Box::new(action)),
        }
    }

    /// Create an armed handle for the subscription with the given id.
    pub(crate) fn with_id<F>(id: String, action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            id: Some(id),
            state: HandleState::Armed(Box::new(action)),
        }
    }

    /// Create an empty handle.
    pub fn empty() -> Self {
        Self {
            id: None,
            state: HandleState::Released,
        }
    }

    /// The correlation id of the subscription, if the handle has one.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Check whether releasing the handle would still run its action.
    pub fn is_armed(&self) -> bool {
        matches!(self.state, HandleState::Armed(_))
    }

    /// Run the release action now.
    ///
    /// Later releases, including the one on drop, do nothing.
    pub fn release(&mut self) {
        if let HandleState::Armed(action) =
            std::mem::replace(&mut self.state, HandleState::Released)
        {
            action();
        }
    }

    /// Disarm the handle without running the release action.
    pub fn detach(mut self) {
        self.state = HandleState::Released;
    }
}

impl Default for SubscriptionHandle {
    fn default() -> Self {
        Self::empty()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.id)
            .field("armed", &self.is_armed())
            .finish()
    }
}
