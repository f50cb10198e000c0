//! Subscriber registries for connection-state and message observers.
//!
//! An [`Observers`] set hands out a [`Subscription`] per registration. Fan-out
//! takes a snapshot of the registered handlers before invoking any of them,
//! so handlers may subscribe or unsubscribe (including themselves) from
//! inside a callback without disturbing the pass in progress. No ordering is
//! guaranteed between handlers of the same set.

use std::{
    any::Any,
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{
        Arc,
        Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use dashmap::DashMap;
use log::error;

/// Shared callback stored by an [`Observers`] set.
pub type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

trait Detach: Send + Sync {
    fn detach(&self, id: u64) -> bool;
}

struct HandlerSet<T> {
    handlers: DashMap<u64, Handler<T>>,
    next_id: AtomicU64,
}

impl<T: 'static> Detach for HandlerSet<T> {
    fn detach(&self, id: u64) -> bool { self.handlers.remove(&id).is_some() }
}

/// A set of observers notified with values of type `T`.
pub struct Observers<T> {
    set: Arc<HandlerSet<T>>,
}

impl<T> Clone for Observers<T> {
    fn clone(&self) -> Self {
        Self {
            set: Arc::clone(&self.set),
        }
    }
}

impl<T> Default for Observers<T> {
    fn default() -> Self {
        Self {
            set: Arc::new(HandlerSet {
                handlers: DashMap::new(),
                next_id: AtomicU64::new(1),
            }),
        }
    }
}

impl<T> fmt::Debug for Observers<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("len", &self.set.handlers.len())
            .finish()
    }
}

impl<T: 'static> Observers<T> {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Register `handler` and return its subscription.
    ///
    /// Registering the same closure twice yields two independent
    /// subscriptions, each notified once per event.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::{
    ///     Arc,
    ///     atomic::{AtomicUsize, Ordering},
    /// };
    ///
    /// use netview::Observers;
    ///
    /// let observers = Observers::<bool>::new();
    /// let hits = Arc::new(AtomicUsize::new(0));
    /// let count = hits.clone();
    /// let subscription = observers.add(move |_connected: &bool| {
    ///     count.fetch_add(1, Ordering::SeqCst);
    /// });
    /// assert_eq!(observers.len(), 1);
    /// assert!(subscription.unsubscribe());
    /// assert!(observers.is_empty());
    /// ```
    pub fn add<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.set.next_id.fetch_add(1, Ordering::Relaxed);
        self.set.handlers.insert(id, Arc::new(handler));
        let set: Arc<dyn Detach> = self.set.clone();
        Subscription {
            id,
            set: Arc::downgrade(&set),
        }
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize { self.set.handlers.len() }

    /// Returns `true` if no handler is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.set.handlers.is_empty() }

    /// Invoke every handler registered when the call starts.
    ///
    /// A panicking handler is logged and skipped; the remaining handlers still
    /// run.
    pub(crate) fn notify_all(&self, value: &T) {
        let snapshot: Vec<(u64, Handler<T>)> = self
            .set
            .handlers
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        for (id, handler) in snapshot {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(value))) {
                error!(
                    "observer panicked: subscription={id}, panic={}",
                    panic_text(payload.as_ref())
                );
            }
        }
    }
}

fn panic_text(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "<non-string panic payload>"
    }
}

/// Token returned by [`Observers::add`].
///
/// Dropping the token does not unsubscribe; call [`Subscription::unsubscribe`]
/// when the observer goes away. The token does not keep the set alive.
#[must_use = "keep the subscription to be able to unsubscribe later"]
pub struct Subscription {
    id: u64,
    set: Weak<dyn Detach>,
}

impl Subscription {
    /// Remove the handler. Returns `false` if it was already removed or the
    /// set no longer exists.
    pub fn unsubscribe(&self) -> bool { self.set.upgrade().is_some_and(|set| set.detach(self.id)) }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
