//! Predicate/callback subscriptions over a shared report stream.
//!
//! An [`EventHandlers`] list is owned by whoever produces items (the raw
//! transport, or the receiver for decoded reports). Consumers register an
//! [`EventHandler`] and keep the returned [`HandlerLock`]; dropping or
//! releasing the lock unregisters the handler.
//!
//! Callbacks run synchronously on the thread calling
//! [`EventHandlers::dispatch`]. The registry lock is not held while they
//! run, so a callback may add or release handlers, including its own.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

type Predicate<T> = dyn Fn(&T) -> bool + Send + Sync;
type Callback<T> = dyn Fn(&T) + Send + Sync;

/// A predicate and the callback to run for items it accepts.
pub struct EventHandler<T: ?Sized> {
    predicate: Box<Predicate<T>>,
    callback: Box<Callback<T>>,
}

impl<T: ?Sized> EventHandler<T> {
    /// Create a handler from a predicate and a callback.
    pub fn new<P, C>(predicate: P, callback: C) -> Self
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
        C: Fn(&T) + Send + Sync + 'static,
    {
        Self {
            predicate: Box::new(predicate),
            callback: Box::new(callback),
        }
    }
}

impl<T: ?Sized> fmt::Debug for EventHandler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandler").finish_non_exhaustive()
    }
}

struct Entry<T: ?Sized> {
    active: AtomicBool,
    handler: EventHandler<T>,
}

struct Registry<T: ?Sized> {
    next_id: AtomicU64,
    entries: Mutex<BTreeMap<u64, Arc<Entry<T>>>>,
}

trait Unregister: Send + Sync {
    fn unregister(&self, id: u64);
}

impl<T: ?Sized + 'static> Unregister for Registry<T> {
    fn unregister(&self, id: u64) {
        let removed = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        if let Some(entry) = removed {
            entry.active.store(false, Ordering::SeqCst);
        }
    }
}

/// A list of handlers sharing one item stream.
pub struct EventHandlers<T: ?Sized> {
    registry: Arc<Registry<T>>,
}

impl<T: ?Sized + 'static> EventHandlers<T> {
    /// Create an empty handler list.
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry {
                next_id: AtomicU64::new(0),
                entries: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    /// Register a handler. It stays registered until the lock is released.
    #[must_use = "dropping the lock unregisters the handler"]
    pub fn add(&self, handler: EventHandler<T>) -> HandlerLock {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = Arc::new(Entry {
            active: AtomicBool::new(true),
            handler,
        });
        self.registry
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, entry);

        let registry: Weak<dyn Unregister> = Arc::downgrade(&self.registry) as Weak<dyn Unregister>;
        HandlerLock {
            inner: Some((id, registry)),
        }
    }

    /// Run every registered handler whose predicate accepts `item`.
    ///
    /// Handlers are called in registration order on the calling thread.
    pub fn dispatch(&self, item: &T) {
        let snapshot: Vec<Arc<Entry<T>>> = self
            .registry
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();

        for entry in snapshot {
            // Skip handlers released by an earlier callback of this dispatch.
            if !entry.active.load(Ordering::SeqCst) {
                continue;
            }
            if (entry.handler.predicate)(item) {
                (entry.handler.callback)(item);
            }
        }
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.registry
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: ?Sized + 'static> Default for EventHandlers<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for EventHandlers<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlers").finish_non_exhaustive()
    }
}

/// Registration handle returned by [`EventHandlers::add`].
///
/// The default value is empty: it refers to no registration. Releasing is
/// idempotent and also happens on drop. A lock may outlive its handler
/// list; releasing it then does nothing.
#[derive(Default)]
pub struct HandlerLock {
    inner: Option<(u64, Weak<dyn Unregister>)>,
}

impl HandlerLock {
    /// An empty lock.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether this lock still refers to a registration.
    pub fn is_active(&self) -> bool {
        self.inner.is_some()
    }

    /// Unregister the handler. Once this returns the callback will not be
    /// started again; a call already in progress is not interrupted.
    pub fn release(&mut self) {
        if let Some((id, registry)) = self.inner.take()
            && let Some(registry) = registry.upgrade()
        {
            registry.unregister(id);
        }
    }
}

impl Drop for HandlerLock {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for HandlerLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Some((id, _)) => f.debug_tuple("HandlerLock").field(id).finish(),
            None => f.write_str("HandlerLock(empty)"),
        }
    }
}
