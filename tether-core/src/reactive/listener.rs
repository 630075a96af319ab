//! Listener registry.
//!
//! Every cell owns two registries: one for change callbacks (invoked with the
//! new value) and one for invalidation callbacks (invoked with nothing).
//! Registering a callback returns a [`ListenerHandle`] that removes exactly
//! that registration, so two structurally identical closures stay
//! independently removable.
//!
//! # Dispatch
//!
//! Notification walks a snapshot of the registry in registration order. The
//! registry lock is never held while a callback runs, which lets callbacks
//! register or remove listeners (including themselves) mid-dispatch. A
//! listener removed during a pass is skipped for the rest of that pass.
//!
//! A panicking listener is isolated: the panic is caught, logged, and the
//! remaining listeners of the same event still run.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use smallvec::SmallVec;

/// Callback invoked with a cell's new value.
pub type ChangeListener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Callback invoked when a cell's cached value may be stale.
pub type InvalidationListener = Arc<dyn Fn() + Send + Sync>;

/// Unique identifier for a registered listener.
///
/// Removal is keyed by this id, never by comparing callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Generate a new unique listener ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

type Entries<F> = Mutex<IndexMap<ListenerId, Arc<F>>>;

/// An ordered set of callbacks of one kind.
pub struct Listeners<F: ?Sized> {
    entries: Arc<Entries<F>>,
}

impl<F> Listeners<F>
where
    F: ?Sized + Send + Sync + 'static,
{
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(IndexMap::new())),
        }
    }

    /// Append a listener and return the handle that removes it.
    pub fn add(&self, listener: Arc<F>) -> ListenerHandle {
        let id = ListenerId::new();
        self.entries.lock().insert(id, listener);

        // The handle only holds a weak reference: a cell that is dropped
        // takes its listeners with it, and a late remove() is a no-op.
        let entries = Arc::downgrade(&self.entries);
        ListenerHandle::new(move || {
            if let Some(entries) = entries.upgrade() {
                entries.lock().shift_remove(&id);
            }
        })
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    fn snapshot(&self) -> SmallVec<[(ListenerId, Arc<F>); 4]> {
        self.entries
            .lock()
            .iter()
            .map(|(id, listener)| (*id, Arc::clone(listener)))
            .collect()
    }

    /// Invoke `call` on every listener in registration order.
    ///
    /// Returns the number of listeners that panicked.
    pub fn for_each(&self, mut call: impl FnMut(&F)) -> usize {
        let mut failures = 0;

        for (id, listener) in self.snapshot() {
            if !self.entries.lock().contains_key(&id) {
                continue;
            }

            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| call(&listener))) {
                failures += 1;
                tracing::error!(
                    listener = %id,
                    reason = panic_message(payload.as_ref()),
                    "listener panicked; remaining listeners still run"
                );
            }
        }

        failures
    }
}

impl<T: 'static> Listeners<dyn Fn(&T) + Send + Sync> {
    /// Deliver a new value to every change listener.
    pub fn notify(&self, value: &T) -> usize {
        self.for_each(|listener| listener(value))
    }
}

impl Listeners<dyn Fn() + Send + Sync> {
    /// Deliver an invalidation to every listener.
    pub fn notify(&self) -> usize {
        self.for_each(|listener| listener())
    }
}

impl<F> Default for Listeners<F>
where
    F: ?Sized + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<F: ?Sized> fmt::Debug for Listeners<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("len", &self.entries.lock().len())
            .finish()
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Detaches one registration.
///
/// Dropping a handle does NOT remove the listener; call [`remove`] to detach.
/// Removal is idempotent.
///
/// [`remove`]: ListenerHandle::remove
pub struct ListenerHandle {
    remover: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl ListenerHandle {
    pub(crate) fn new<F>(remover: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            remover: Mutex::new(Some(Box::new(remover))),
        }
    }

    /// A handle with nothing to remove, issued by cells that never notify.
    pub fn noop() -> Self {
        Self {
            remover: Mutex::new(None),
        }
    }

    /// Combine several handles into one that removes all of them.
    pub fn merge<I>(handles: I) -> Self
    where
        I: IntoIterator<Item = ListenerHandle>,
    {
        let handles: SmallVec<[ListenerHandle; 2]> = handles.into_iter().collect();
        Self::new(move || {
            for handle in &handles {
                handle.remove();
            }
        })
    }

    /// Remove the listener this handle was issued for.
    pub fn remove(&self) {
        let remover = self.remover.lock().take();
        if let Some(remover) = remover {
            remover();
        }
    }

    /// Whether [`remove`](ListenerHandle::remove) still has work to do.
    pub fn is_attached(&self) -> bool {
        self.remover.lock().is_some()
    }
}

impl fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerHandle")
            .field("attached", &self.is_attached())
            .finish()
    }
}
