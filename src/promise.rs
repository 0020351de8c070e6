//! Single-assignment cross-task result cell.
//!
//! A [`Promise`] hands one value from the task that produces it (the
//! connection's stream completion path) to any number of readers. The value
//! is set at most once and, once set, is permanently visible. Readers park
//! on a [`tokio::sync::Notify`] rather than polling, and may bound their
//! wait with a deadline, observing "not yet available" instead of a wrong
//! value.
//!
//! # Example
//!
//! ```
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! use wirecall::Promise;
//!
//! let promise: Promise<u32> = Promise::new();
//! let writer = promise.clone();
//! tokio::spawn(async move {
//!     writer.set(42);
//! });
//! assert_eq!(promise.get().await, 42);
//! # });
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;

struct Inner<T> {
    slot: Mutex<Option<T>>,
    notify: Notify,
}

/// Single-assignment result cell shared between tasks.
///
/// Cheap to clone; all clones observe the same cell.
pub struct Promise<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Promise<T> {
    /// Create an empty promise.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                slot: Mutex::new(None),
                notify: Notify::new(),
            }),
        }
    }

    /// Store the value, waking all waiting readers.
    ///
    /// Returns `true` if this call stored the value. At most one `set` ever
    /// succeeds; losers leave the stored value untouched.
    pub fn set(&self, value: T) -> bool {
        {
            let mut slot = self.inner.slot.lock().unwrap_or_else(|e| e.into_inner());
            if slot.is_some() {
                return false;
            }
            *slot = Some(value);
        }
        self.inner.notify.notify_waiters();
        true
    }

    /// Whether a value has been set.
    pub fn is_set(&self) -> bool {
        self.inner
            .slot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

impl<T: Clone> Promise<T> {
    /// Return the value if already set, without waiting.
    pub fn try_get(&self) -> Option<T> {
        self.inner
            .slot
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Wait until the value is set and return it.
    pub async fn get(&self) -> T {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register interest before checking, so a set() racing with this
            // read cannot slip between the check and the park.
            notified.as_mut().enable();
            if let Some(value) = self.try_get() {
                return value;
            }
            notified.await;
        }
    }

    /// Wait up to `timeout` for the value.
    ///
    /// Returns `None` when the deadline elapses first; the promise itself is
    /// untouched and a later `get` can still observe the value.
    pub async fn get_timeout(&self, timeout: Duration) -> Option<T> {
        tokio::time::timeout(timeout, self.get()).await.ok()
    }
}
