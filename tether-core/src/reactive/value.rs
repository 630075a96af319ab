//! Read-only cells.
//!
//! [`Observable`] is the capability every cell provides: produce a value,
//! report validity, and accept change and invalidation listeners.
//! [`Value`] is the cheap, cloneable handle through which cells are shared
//! and composed.
//!
//! # Example
//!
//! ```rust
//! use tether_core::reactive::{Property, Value};
//!
//! let base = Property::of(10);
//! let label = base.map(|n| n * 2).map(|n| format!("Doubled: {n}"));
//!
//! assert_eq!(label.get(), "Doubled: 20");
//!
//! base.set(15);
//! assert!(!label.is_valid());
//! assert_eq!(label.get(), "Doubled: 30");
//!
//! let constant = Value::wrap("fixed");
//! assert!(constant.is_valid());
//! ```

use std::fmt;
use std::iter;
use std::sync::Arc;

use super::constant::Constant;
use super::derived::Derived;
use super::listener::{ChangeListener, InvalidationListener, ListenerHandle};

/// Bound shared by every value a cell can hold.
///
/// `PartialEq` drives change detection on recompute, so it must be total and
/// free of side effects.
pub trait CellValue: Clone + PartialEq + Send + Sync + 'static {}

impl<T> CellValue for T where T: Clone + PartialEq + Send + Sync + 'static {}

/// A source of values of type `T` that can be observed.
pub trait Observable<T: CellValue>: Send + Sync {
    /// Current value, recomputing first if the cell is invalid.
    fn get(&self) -> T;

    /// Whether the cached value reflects the current inputs.
    fn is_valid(&self) -> bool;

    /// Mark the cached value stale.
    fn invalidate(&self);

    /// Register a callback invoked with every new value.
    fn add_change_listener(&self, listener: ChangeListener<T>) -> ListenerHandle;

    /// Register a callback invoked when the cell becomes invalid.
    fn add_invalidation_listener(&self, listener: InvalidationListener) -> ListenerHandle;

    /// The fixed value of an immutable cell.
    ///
    /// Used to decide whether rebinding to another cell is a no-op.
    fn constant(&self) -> Option<&T> {
        None
    }
}

/// Shared handle to a read-only cell.
pub struct Value<T: CellValue> {
    cell: Arc<dyn Observable<T>>,
}

impl<T: CellValue> Value<T> {
    /// A cell that always holds `value`.
    pub fn wrap(value: T) -> Self {
        Self::from_cell(Constant::new(value))
    }

    /// A cell recomputed from `compute` on every read.
    ///
    /// Without dependencies the cell has nothing to tell it when a cached
    /// result goes stale, so it never stays valid.
    pub fn dynamic<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::dynamic_with(compute, iter::empty())
    }

    /// A cell computed from `compute` and cached until one of `dependencies`
    /// changes or is invalidated.
    pub fn dynamic_with<F, D>(compute: F, dependencies: D) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        D: IntoIterator<Item = Dependency>,
    {
        Self::from_shared(Derived::new(compute, dependencies))
    }

    /// Wrap any cell implementation.
    pub fn from_cell<C>(cell: C) -> Self
    where
        C: Observable<T> + 'static,
    {
        Self::from_shared(Arc::new(cell))
    }

    /// Wrap an already shared cell.
    pub fn from_shared(cell: Arc<dyn Observable<T>>) -> Self {
        Self { cell }
    }

    pub fn get(&self) -> T {
        self.cell.get()
    }

    pub fn is_valid(&self) -> bool {
        self.cell.is_valid()
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

    /// Derive a read-only cell that applies `mapper` to this cell's value.
    ///
    /// The derived cell depends on this one and recomputes lazily after it
    /// changes.
    pub fn map<X, F>(&self, mapper: F) -> Value<X>
    where
        X: CellValue,
        F: Fn(&T) -> X + Send + Sync + 'static,
    {
        let source = self.clone();
        Value::dynamic_with(move || mapper(&source.get()), [self.dependency()])
    }

    /// Type-erased view of this cell for use as an invalidation dependency.
    pub fn dependency(&self) -> Dependency {
        Dependency::new(Erased(self.clone()))
    }

    /// Whether both handles point at the same cell.
    pub fn same_cell(&self, other: &Value<T>) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.cell), Arc::as_ptr(&other.cell))
    }

    /// Forward both change and invalidation events to `notify`.
    pub(crate) fn subscribe(&self, notify: InvalidationListener) -> ListenerHandle {
        let on_change = Arc::clone(&notify);
        ListenerHandle::merge([
            self.cell.add_change_listener(Arc::new(move |_: &T| on_change())),
            self.cell.add_invalidation_listener(notify),
        ])
    }
}

impl<T: CellValue> Clone for Value<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

/// Two handles are equal when they share a cell, or when both are immutable
/// cells holding equal values.
impl<T: CellValue> PartialEq for Value<T> {
    fn eq(&self, other: &Self) -> bool {
        if self.same_cell(other) {
            return true;
        }

        match (self.cell.constant(), other.cell.constant()) {
            (Some(left), Some(right)) => left == right,
            _ => false,
        }
    }
}

impl<T: CellValue + fmt::Debug> fmt::Debug for Value<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never pull here: formatting must not recompute or notify.
        f.debug_struct("Value")
            .field("constant", &self.cell.constant())
            .field("valid", &self.is_valid())
            .finish()
    }
}

impl<T: CellValue> From<T> for Value<T> {
    fn from(value: T) -> Self {
        Self::wrap(value)
    }
}

/// The untyped part of a cell that dependents care about.
pub(crate) trait Source: Send + Sync {
    fn is_valid(&self) -> bool;

    fn subscribe(&self, notify: InvalidationListener) -> ListenerHandle;
}

struct Erased<T: CellValue>(Value<T>);

impl<T: CellValue> Source for Erased<T> {
    fn is_valid(&self) -> bool {
        self.0.is_valid()
    }

    fn subscribe(&self, notify: InvalidationListener) -> ListenerHandle {
        self.0.subscribe(notify)
    }
}

/// A cell of any value type, used as an invalidation dependency of a derived
/// cell.
#[derive(Clone)]
pub struct Dependency {
    source: Arc<dyn Source>,
}

impl Dependency {
    fn new<S: Source + 'static>(source: S) -> Self {
        Self {
            source: Arc::new(source),
        }
    }

    /// Whether the underlying cell is currently valid.
    pub fn is_valid(&self) -> bool {
        self.source.is_valid()
    }

    pub(crate) fn subscribe(&self, notify: InvalidationListener) -> ListenerHandle {
        self.source.subscribe(notify)
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependency")
            .field("valid", &self.is_valid())
            .finish()
    }
}

impl<T: CellValue> From<&Value<T>> for Dependency {
    fn from(value: &Value<T>) -> Self {
        value.dependency()
    }
}

impl<T: CellValue> From<Value<T>> for Dependency {
    fn from(value: Value<T>) -> Self {
        Dependency::new(Erased(value))
    }
}
