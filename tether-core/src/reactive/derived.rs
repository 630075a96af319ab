//! Derived Cell Implementation
//!
//! A derived cell caches the result of a computation and recomputes lazily.
//!
//! # How Derived Cells Work
//!
//! 1. Construction subscribes to every dependency. A change or invalidation
//!    of any dependency invalidates this cell; nothing is recomputed yet.
//!
//! 2. A read of a valid cell returns the cache.
//!
//! 3. A read of an invalid cell runs the computation. If the result differs
//!    from the cache, the cache is replaced and change listeners fire before
//!    validity is settled.
//!
//! 4. The cell becomes valid again only if it has dependencies, all of them
//!    report valid, and no invalidation arrived from another thread since
//!    the computation started.
//!    A cell without dependencies is never valid after a read: it is a
//!    pull-always leaf for wrapping external state.
//!
//! # Failure
//!
//! A panicking computation unwinds to the caller of `get()` with the cache
//! and validity untouched.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex};
use smallvec::SmallVec;

use super::listener::{ChangeListener, InvalidationListener, ListenerHandle, Listeners};
use super::sync::{Pull, Validity};
use super::value::{CellValue, Dependency, Observable};

/// Counter for generating unique derived cell IDs.
static DERIVED_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_derived_id() -> u64 {
    DERIVED_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// A cached value computed from a closure.
///
/// Usually built through [`Value::dynamic`](super::Value::dynamic),
/// [`Value::dynamic_with`](super::Value::dynamic_with) or `map`.
pub struct Derived<T: CellValue> {
    id: u64,

    compute: Box<dyn Fn() -> T + Send + Sync>,

    dependencies: SmallVec<[Dependency; 2]>,

    /// Our subscriptions to `dependencies`, detached on drop.
    subscriptions: SmallVec<[ListenerHandle; 2]>,

    /// Serializes recomputation. Reentrant so listeners may read us back.
    scope: ReentrantMutex<()>,

    /// Last computed value; `None` until the first read.
    cached: Mutex<Option<T>>,

    validity: Validity,

    /// Set while `compute` runs, to recognize echoes from our own inputs.
    pull: Pull,

    change: Listeners<dyn Fn(&T) + Send + Sync>,
    invalidation: Listeners<dyn Fn() + Send + Sync>,
}

impl<T: CellValue> Derived<T> {
    /// Create a derived cell. The computation does not run until first read.
    pub fn new<F, D>(compute: F, dependencies: D) -> Arc<Self>
    where
        F: Fn() -> T + Send + Sync + 'static,
        D: IntoIterator<Item = Dependency>,
    {
        let dependencies: SmallVec<[Dependency; 2]> = dependencies.into_iter().collect();

        Arc::new_cyclic(|this: &Weak<Self>| {
            let subscriptions = dependencies
                .iter()
                .map(|dependency| {
                    let this = Weak::clone(this);
                    dependency.subscribe(Arc::new(move || {
                        if let Some(cell) = this.upgrade() {
                            cell.invalidate();
                        }
                    }))
                })
                .collect();

            Self {
                id: next_derived_id(),
                compute: Box::new(compute),
                dependencies,
                subscriptions,
                scope: ReentrantMutex::new(()),
                cached: Mutex::new(None),
                validity: Validity::new(false),
                pull: Pull::default(),
                change: Listeners::new(),
                invalidation: Listeners::new(),
            }
        })
    }

    /// Get the cell's unique ID.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Number of invalidation dependencies.
    pub fn dependency_count(&self) -> usize {
        self.dependencies.len()
    }

    /// Whether the computation has produced a value yet.
    pub fn has_value(&self) -> bool {
        self.cached.lock().is_some()
    }

    fn recompute(&self) -> T {
        let epoch = self.validity.snapshot();
        let next = {
            let _pull = self.pull.begin();
            (self.compute)()
        };

        let changed = {
            let mut cached = self.cached.lock();
            if cached.as_ref() == Some(&next) {
                false
            } else {
                *cached = Some(next.clone());
                true
            }
        };

        if changed {
            tracing::trace!(derived = self.id, "recomputed a new value");
            self.change.notify(&next);
        }

        let settled = !self.dependencies.is_empty()
            && self.dependencies.iter().all(Dependency::is_valid);

        if settled {
            self.validity.commit(epoch);
        }

        next
    }
}

impl<T: CellValue> Observable<T> for Derived<T> {
    fn get(&self) -> T {
        let _scope = self.scope.lock();

        if self.validity.is_valid() {
            if let Some(cached) = self.cached.lock().as_ref() {
                return cached.clone();
            }
        }

        self.recompute()
    }

    fn is_valid(&self) -> bool {
        self.validity.is_valid()
    }

    fn invalidate(&self) {
        // Reading an input can make it notify us on this same thread.
        if self.pull.is_current() {
            return;
        }

        if self.validity.invalidate() {
            tracing::trace!(derived = self.id, "invalidated");
            self.invalidation.notify();
        }
    }

    fn add_change_listener(&self, listener: ChangeListener<T>) -> ListenerHandle {
        self.change.add(listener)
    }

    fn add_invalidation_listener(&self, listener: InvalidationListener) -> ListenerHandle {
        self.invalidation.add(listener)
    }
}

impl<T: CellValue> Drop for Derived<T> {
    fn drop(&mut self) {
        for subscription in &self.subscriptions {
            subscription.remove();
        }
    }
}

impl<T: CellValue + fmt::Debug> fmt::Debug for Derived<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Derived")
            .field("id", &self.id)
            .field("cached", &*self.cached.lock())
            .field("valid", &self.validity.is_valid())
            .field("dependency_count", &self.dependencies.len())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
