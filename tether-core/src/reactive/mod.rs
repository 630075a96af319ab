//! Reactive Primitives
//!
//! This module implements the observation and propagation engine: immutable
//! cells, derived cells, mutable properties, and two-way links between
//! properties.
//!
//! # Concepts
//!
//! ## Cells
//!
//! A cell produces a value and reports whether its cached value is still
//! valid. Any cell accepts change listeners (called with the new value) and
//! invalidation listeners (called when the cache may be stale).
//!
//! ## Derived Cells
//!
//! A derived cell caches the result of a closure. Dependencies are declared
//! explicitly when the cell is built; a change or invalidation of any of them
//! invalidates the cell, which recomputes on its next read.
//!
//! ## Properties
//!
//! A property is a mutable cell. It can be written with a value or bound to
//! follow any other cell. Properties can be linked in both directions with a
//! pair of transforms.
//!
//! # Implementation Notes
//!
//! The model is pull-on-read with push-only invalidation. There is no
//! scheduler and no global registry: a write notifies its own listeners and
//! invalidates dependents synchronously, and dependents recompute when read.
//!
//! Upstream cells refer to their dependents only through `Weak` references
//! held in listener closures, so ownership stays acyclic even when two
//! properties are linked both ways.

mod constant;
mod derived;
mod link;
mod listener;
mod property;
mod sync;
mod value;

pub use constant::Constant;
pub use derived::Derived;
pub use listener::{ChangeListener, InvalidationListener, ListenerHandle, ListenerId, Listeners};
pub use property::{Property, WeakProperty};
pub use value::{CellValue, Dependency, Observable, Value};
