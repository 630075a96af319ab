//! Two-way links between properties.
//!
//! [`Property::bimap`] creates a child property that mirrors its source
//! through a pair of transforms: writes to the source reach the child through
//! `to_child`, writes to the child reach the source through `to_source`.
//!
//! # Loop Prevention
//!
//! Both directions share one [`Latch`]. Whichever side starts propagating
//! holds it until its write on the other side returns; a propagation attempt
//! made while the latch is held is dropped (not queued, not retried). This
//! stops the echo of a write from bouncing back.
//!
//! The cost is that a non-invertible pair can leave the two sides out of
//! step: if `to_child(to_source(x)) != x`, the child keeps `x` while the
//! source holds `to_source(x)`, because re-deriving the child would need the
//! dropped propagation.
//!
//! # Locking
//!
//! The child shares the source's scope, so both cells and the latch sit in a
//! single exclusion region. Concurrent writers on the two sides serialize
//! instead of racing the latch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::property::Property;
use super::value::CellValue;

/// Single-slot exclusive latch.
#[derive(Debug, Default)]
pub(crate) struct Latch {
    held: AtomicBool,
}

impl Latch {
    /// Take the latch, or `None` if a propagation is already in flight.
    pub(crate) fn try_acquire(&self) -> Option<LatchGuard<'_>> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| LatchGuard { latch: self })
    }

    pub(crate) fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

/// Releases the latch on drop, including when a transform panics.
pub(crate) struct LatchGuard<'a> {
    latch: &'a Latch,
}

impl Drop for LatchGuard<'_> {
    fn drop(&mut self) {
        self.latch.held.store(false, Ordering::Release);
    }
}

impl<T: CellValue> Property<T> {
    /// Create a child property linked to this one in both directions.
    ///
    /// ```rust
    /// use tether_core::reactive::Property;
    ///
    /// let p = Property::of(10);
    /// let child = p.bimap(|n| n * 2, |s| s / 2);
    /// assert_eq!(child.get(), 20);
    ///
    /// p.set(5);
    /// assert_eq!(child.get(), 10);
    ///
    /// child.set(6);
    /// assert_eq!(p.get(), 3);
    /// ```
    pub fn bimap<X, F, G>(&self, to_child: F, to_source: G) -> Property<X>
    where
        X: CellValue,
        F: Fn(&T) -> X + Send + Sync + 'static,
        G: Fn(&X) -> T + Send + Sync + 'static,
    {
        let source = self.clone();
        self.link(to_child, move |value: &X| source.set(to_source(value)))
    }

    /// Like [`bimap`](Property::bimap), but writes to the child call
    /// `listener` instead of writing back into this property.
    ///
    /// `listener` only sees writes made to the child from outside, never the
    /// values pushed into it from this property.
    pub fn map_with_listener<X, F, L>(&self, to_child: F, listener: L) -> Property<X>
    where
        X: CellValue,
        F: Fn(&T) -> X + Send + Sync + 'static,
        L: Fn(&X) + Send + Sync + 'static,
    {
        self.link(to_child, listener)
    }

    fn link<X, F, B>(&self, to_child: F, backward: B) -> Property<X>
    where
        X: CellValue,
        F: Fn(&T) -> X + Send + Sync + 'static,
        B: Fn(&X) + Send + Sync + 'static,
    {
        let _scope = self.cell.scope.lock();

        let latch = Arc::new(Latch::default());
        let child = Property::with_scope(Arc::clone(&self.cell.scope), to_child(&self.get()));

        // Source -> child. The source only holds the child weakly, and the
        // child removes this listener when it is dropped.
        let forward = {
            let child = child.downgrade();
            let latch = Arc::clone(&latch);
            self.add_change_listener(move |value: &T| {
                let Some(child) = child.upgrade() else {
                    return;
                };

                let Some(_guard) = latch.try_acquire() else {
                    tracing::trace!(child = child.id(), "link busy; dropping source -> child write");
                    return;
                };

                child.set(to_child(value));
            })
        };
        child.hold(forward);

        // Child -> source.
        let child_id = child.id();
        child.add_change_listener(move |value: &X| {
            let Some(_guard) = latch.try_acquire() else {
                tracing::trace!(child = child_id, "link busy; dropping child -> source write");
                return;
            };

            backward(value);
        });

        child
    }
}
