//! Property Implementation
//!
//! A Property is the mutable cell. It always tracks exactly one other cell
//! and caches the last value it observed from it.
//!
//! # How Properties Work
//!
//! 1. `set(value)` re-points the property at a fresh constant, stores the
//!    value, marks the property valid, and notifies every change listener.
//!    This happens even when the value equals the cached one: an explicit
//!    write is always an event.
//!
//! 2. `bind(cell)` re-points the property at any other cell. Changes and
//!    invalidations of that cell invalidate the property; nothing is pulled
//!    until the next read.
//!
//! 3. `get()` on an invalid property pulls from the tracked cell and notifies
//!    change listeners only if the pulled value differs from the cache. The
//!    property then adopts the tracked cell's validity, so a property bound
//!    to a dependency-free computation pulls on every read.
//!
//! # Thread Safety
//!
//! Reads and writes run under the property's scope, a reentrant mutex that
//! linked properties share. Listeners run inside that scope and may read or
//! write the same property on the same thread.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;

use super::listener::{ChangeListener, InvalidationListener, ListenerHandle, Listeners};
use super::sync::{new_scope, Pull, Scope, Validity};
use super::value::{CellValue, Dependency, Observable, Value};

/// Counter for generating unique property IDs.
static PROPERTY_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_property_id() -> u64 {
    PROPERTY_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

struct PropertyState<T: CellValue> {
    /// The cell currently followed.
    tracked: Value<T>,

    /// Our subscription to `tracked`.
    follow: Option<ListenerHandle>,

    /// Last observed value; `None` until the first observation.
    cached: Option<T>,
}

pub(crate) struct PropertyCell<T: CellValue> {
    id: u64,
    pub(crate) scope: Scope,
    state: Mutex<PropertyState<T>>,
    validity: Validity,
    pull: Pull,
    change: Listeners<dyn Fn(&T) + Send + Sync>,
    invalidation: Listeners<dyn Fn() + Send + Sync>,

    /// Registrations elsewhere that only make sense while we exist.
    held: Mutex<SmallVec<[ListenerHandle; 1]>>,

    this: Weak<PropertyCell<T>>,
}

impl<T: CellValue> PropertyCell<T> {
    fn new(scope: Scope, tracked: Value<T>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            id: next_property_id(),
            scope,
            state: Mutex::new(PropertyState {
                tracked,
                follow: None,
                cached: None,
            }),
            validity: Validity::new(false),
            pull: Pull::default(),
            change: Listeners::new(),
            invalidation: Listeners::new(),
            held: Mutex::new(SmallVec::new()),
            this: Weak::clone(this),
        })
    }

    pub(crate) fn set(&self, value: T) {
        let _scope = self.scope.lock();

        self.bind(Value::wrap(value.clone()));
        self.state.lock().cached = Some(value.clone());
        self.validity.validate();

        tracing::trace!(property = self.id, "explicit write");
        self.change.notify(&value);
    }

    pub(crate) fn bind(&self, tracked: Value<T>) {
        let _scope = self.scope.lock();

        let (previous, unchanged) = {
            let mut state = self.state.lock();
            let unchanged = state.tracked == tracked;
            state.tracked = tracked.clone();
            (state.follow.take(), unchanged)
        };

        if let Some(previous) = previous {
            previous.remove();
        }

        let this = Weak::clone(&self.this);
        let follow = tracked.subscribe(Arc::new(move || {
            if let Some(cell) = this.upgrade() {
                cell.invalidate();
            }
        }));
        self.state.lock().follow = Some(follow);

        if !unchanged {
            tracing::trace!(property = self.id, "rebound to a different cell");
            self.invalidate();
        }
    }

    fn cached(&self) -> Option<T> {
        self.state.lock().cached.clone()
    }
}

impl<T: CellValue> Observable<T> for PropertyCell<T> {
    fn get(&self) -> T {
        let _scope = self.scope.lock();

        let tracked = {
            let state = self.state.lock();
            if self.validity.is_valid() {
                if let Some(cached) = &state.cached {
                    return cached.clone();
                }
            }
            state.tracked.clone()
        };

        let epoch = self.validity.snapshot();
        let next = {
            let _pull = self.pull.begin();
            tracked.get()
        };

        let changed = {
            let mut state = self.state.lock();
            if state.cached.as_ref() == Some(&next) {
                false
            } else {
                state.cached = Some(next.clone());
                true
            }
        };

        if changed {
            tracing::trace!(property = self.id, "pulled a new value");
            self.change.notify(&next);
        }

        // A tracked cell that never stabilizes keeps us pulling too.
        if tracked.is_valid() {
            self.validity.commit(epoch);
        }

        next
    }

    fn is_valid(&self) -> bool {
        self.validity.is_valid()
    }

    fn invalidate(&self) {
        // Echo of our own pull from the tracked cell.
        if self.pull.is_current() {
            return;
        }

        if self.validity.invalidate() {
            tracing::trace!(property = self.id, "invalidated");
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

impl<T: CellValue> Drop for PropertyCell<T> {
    fn drop(&mut self) {
        if let Some(follow) = self.state.get_mut().follow.take() {
            follow.remove();
        }

        for handle in self.held.get_mut().drain(..) {
            handle.remove();
        }
    }
}

/// A mutable, observable cell.
///
/// Cloning a `Property` yields another handle to the same cell.
///
/// # Example
///
/// ```rust
/// use tether_core::reactive::Property;
///
/// let port = Property::<Option<u16>>::empty();
/// assert_eq!(port.get(), None);
///
/// // Reading with a default materializes it.
/// assert_eq!(port.get_or(8080), 8080);
/// assert_eq!(port.get(), Some(8080));
/// ```
pub struct Property<T: CellValue> {
    pub(crate) cell: Arc<PropertyCell<T>>,
}

impl<T: CellValue> Property<T> {
    /// Create a property holding `value`.
    pub fn of(value: T) -> Self {
        Self::with_scope(new_scope(), value)
    }

    /// Create a property that tracks `value`.
    pub fn from_value(value: Value<T>) -> Self {
        let cell = PropertyCell::new(new_scope(), value.clone());
        cell.bind(value);
        Self { cell }
    }

    /// Create a property recomputed from `compute` on every read.
    pub fn dynamic<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::from_value(Value::dynamic(compute))
    }

    /// Create a property computed from `compute` and cached until one of
    /// `dependencies` changes.
    pub fn dynamic_with<F, D>(compute: F, dependencies: D) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        D: IntoIterator<Item = Dependency>,
    {
        Self::from_value(Value::dynamic_with(compute, dependencies))
    }

    /// Create a property in an existing scope.
    pub(crate) fn with_scope(scope: Scope, value: T) -> Self {
        let cell = PropertyCell::new(scope, Value::wrap(value.clone()));
        cell.set(value);
        Self { cell }
    }

    /// Get the property's unique ID.
    pub fn id(&self) -> u64 {
        self.cell.id
    }

    /// Current value, pulling from the tracked cell if invalid.
    pub fn get(&self) -> T {
        self.cell.get()
    }

    pub fn is_valid(&self) -> bool {
        self.cell.is_valid()
    }

    /// Write `value` and notify every change listener, even if the value is
    /// unchanged.
    pub fn set(&self, value: T) {
        self.cell.set(value)
    }

    /// Follow another cell.
    ///
    /// Invalidates this property unless `value` is the cell already tracked
    /// (or an equal constant).
    pub fn bind(&self, value: Value<T>) {
        self.cell.bind(value)
    }

    /// Follow a computation with invalidation dependencies.
    pub fn bind_dynamic<F, D>(&self, compute: F, dependencies: D)
    where
        F: Fn() -> T + Send + Sync + 'static,
        D: IntoIterator<Item = Dependency>,
    {
        self.bind(Value::dynamic_with(compute, dependencies))
    }

    pub fn invalidate(&self) {
        self.cell.invalidate()
    }

    pub fn add_change_listener<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.cell.add_change_listener(Arc::new(listener))
    }

    pub fn add_invalidation_listener<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.cell.add_invalidation_listener(Arc::new(listener))
    }

    /// Number of (change, invalidation) listeners.
    pub fn listener_count(&self) -> (usize, usize) {
        (self.cell.change.len(), self.cell.invalidation.len())
    }

    /// This property as a read-only cell.
    pub fn as_value(&self) -> Value<T> {
        Value::from_shared(Arc::clone(&self.cell) as Arc<dyn Observable<T>>)
    }

    /// Type-erased view of this property for use as an invalidation
    /// dependency.
    pub fn dependency(&self) -> Dependency {
        self.as_value().dependency()
    }

    /// Derive a read-only cell that applies `mapper` to this property.
    pub fn map<X, F>(&self, mapper: F) -> Value<X>
    where
        X: CellValue,
        F: Fn(&T) -> X + Send + Sync + 'static,
    {
        self.as_value().map(mapper)
    }

    /// Remove `handle` when the last handle to this property is dropped.
    pub(crate) fn hold(&self, handle: ListenerHandle) {
        self.cell.held.lock().push(handle);
    }

    /// A handle that does not keep the property alive.
    pub fn downgrade(&self) -> WeakProperty<T> {
        WeakProperty {
            cell: Arc::downgrade(&self.cell),
        }
    }
}

impl<U: CellValue> Property<Option<U>> {
    /// Create a property holding `None`.
    pub fn empty() -> Self {
        Self::of(None)
    }

    /// Current value, or `default` written back into the property if there
    /// is none.
    pub fn get_or(&self, default: U) -> U {
        let _scope = self.cell.scope.lock();

        match self.get() {
            Some(value) => value,
            None => {
                self.set(Some(default.clone()));
                default
            }
        }
    }
}

impl<T: CellValue> Clone for Property<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T: CellValue + fmt::Debug> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("id", &self.cell.id)
            .field("cached", &self.cell.cached())
            .field("valid", &self.is_valid())
            .finish()
    }
}

impl<T: CellValue> From<&Property<T>> for Dependency {
    fn from(property: &Property<T>) -> Self {
        property.dependency()
    }
}

impl<T: CellValue> From<Property<T>> for Value<T> {
    fn from(property: Property<T>) -> Self {
        property.as_value()
    }
}

/// Non-owning handle to a [`Property`].
pub struct WeakProperty<T: CellValue> {
    cell: Weak<PropertyCell<T>>,
}

impl<T: CellValue> WeakProperty<T> {
    pub fn upgrade(&self) -> Option<Property<T>> {
        self.cell.upgrade().map(|cell| Property { cell })
    }
}

impl<T: CellValue> Clone for WeakProperty<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Weak::clone(&self.cell),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
