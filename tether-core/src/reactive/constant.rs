//! Immutable cells.

use std::fmt;

use super::listener::{ChangeListener, InvalidationListener, ListenerHandle};
use super::value::{CellValue, Observable};

/// A cell holding a fixed value.
///
/// Always valid. Listeners are accepted but never invoked, and the returned
/// handles have nothing to remove.
#[derive(Clone, PartialEq)]
pub struct Constant<T: CellValue> {
    value: T,
}

impl<T: CellValue> Constant<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }

    pub fn value(&self) -> &T {
        &self.value
    }
}

impl<T: CellValue> Observable<T> for Constant<T> {
    fn get(&self) -> T {
        self.value.clone()
    }

    fn is_valid(&self) -> bool {
        true
    }

    fn invalidate(&self) {}

    fn add_change_listener(&self, _listener: ChangeListener<T>) -> ListenerHandle {
        ListenerHandle::noop()
    }

    fn add_invalidation_listener(&self, _listener: InvalidationListener) -> ListenerHandle {
        ListenerHandle::noop()
    }

    fn constant(&self) -> Option<&T> {
        Some(&self.value)
    }
}

impl<T: CellValue + fmt::Debug> fmt::Debug for Constant<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Constant").field("value", &self.value).finish()
    }
}
