//! Subscriptions and callback lists.
//!
//! Every observer hands out a [`Subscription`] from `subscribe`. Disposing it
//! removes the callback; disposing twice is a no-op, and disposing from
//! inside a notification is safe because observers notify from a snapshot of
//! their callback list.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::value::Value;

/// A change callback, invoked with `(new_value, old_value)`.
pub type Callback = Arc<dyn Fn(&Value, &Value) + Send + Sync>;

/// Wrap a closure as a [`Callback`].
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(&Value, &Value) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Unique identifier for one subscription.
///
/// The same callback subscribed twice gets two ids, so each subscription can
/// be disposed independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Generate a new unique subscription ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

type Disposer = Box<dyn FnOnce() + Send>;

/// Handle that cancels one subscription.
pub struct Subscription {
    disposer: Mutex<Option<Disposer>>,
}

impl Subscription {
    pub fn new<F>(dispose: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            disposer: Mutex::new(Some(Box::new(dispose))),
        }
    }

    /// A subscription with nothing to cancel.
    pub fn empty() -> Self {
        Self {
            disposer: Mutex::new(None),
        }
    }

    /// Cancel the subscription. Safe to call more than once.
    pub fn dispose(&self) {
        let disposer = self.disposer.lock().take();
        if let Some(dispose) = disposer {
            dispose();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposer.lock().is_none()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Ordered set of callbacks owned by an observer.
#[derive(Default)]
pub(crate) struct CallbackList {
    entries: Mutex<Vec<(SubscriptionId, Callback)>>,
}

impl CallbackList {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&self, callback: Callback) -> SubscriptionId {
        let id = SubscriptionId::new();
        self.entries.lock().push((id, callback));
        id
    }

    /// Remove a subscription. Returns whether it was still present.
    pub(crate) fn remove(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(entry, _)| *entry != id);
        before != entries.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Notify every callback, most recent subscriber first.
    ///
    /// Runs from a snapshot, so callbacks may subscribe or dispose freely.
    pub(crate) fn notify(&self, new_value: &Value, old_value: &Value) {
        let snapshot: SmallVec<[Callback; 4]> =
            self.entries.lock().iter().rev().map(|(_, c)| c.clone()).collect();
        for callback in snapshot {
            callback(new_value, old_value);
        }
    }
}
