//! Per-cell synchronization.
//!
//! Every cell serializes its reads and writes behind a [`Scope`], a
//! reentrant mutex. Listeners run while the notifying cell's scope is held,
//! and a listener may call back into the same cell on the same thread.
//! Properties joined by a two-way link share one scope.
//!
//! Validity is kept outside the scope in a [`Validity`] word so that
//! invalidation never has to wait for a recompute in progress. The word packs
//! the validity flag (bit 0) with an epoch counter (bits 1..). Every
//! invalidation advances the epoch, and a recompute only publishes "valid"
//! if the epoch it observed is still current.
//!
//! A recompute takes its epoch before pulling its inputs. Pulling can make an
//! input notify us back on the same thread; those echoes are recognized
//! through [`Pull`] and do not advance the epoch. An invalidation from any
//! other thread does, and the recompute then leaves the cell invalid.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::{Mutex, ReentrantMutex};

/// Exclusion region shared by one cell, or by every cell of a link.
pub(crate) type Scope = Arc<ReentrantMutex<()>>;

pub(crate) fn new_scope() -> Scope {
    Arc::new(ReentrantMutex::new(()))
}

const VALID: u64 = 1;
const EPOCH_STEP: u64 = 2;

/// Epoch observed by a recompute before it publishes validity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Epoch(u64);

/// Atomic validity flag with an invalidation epoch.
pub(crate) struct Validity {
    state: AtomicU64,
}

impl Validity {
    pub(crate) fn new(valid: bool) -> Self {
        Self {
            state: AtomicU64::new(if valid { VALID } else { 0 }),
        }
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.state.load(Ordering::Acquire) & VALID != 0
    }

    /// Clear the flag and advance the epoch.
    ///
    /// Returns whether the flag was set, i.e. whether invalidation listeners
    /// should fire.
    pub(crate) fn invalidate(&self) -> bool {
        let previous = self.advance(|state| (state & !VALID).wrapping_add(EPOCH_STEP));
        previous & VALID != 0
    }

    /// Current epoch, to be handed back to [`commit`](Validity::commit).
    pub(crate) fn snapshot(&self) -> Epoch {
        Epoch(self.state.load(Ordering::Acquire) & !VALID)
    }

    /// Mark valid unless an invalidation landed after `epoch` was taken.
    pub(crate) fn commit(&self, epoch: Epoch) -> bool {
        self.state
            .compare_exchange(epoch.0, epoch.0 | VALID, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Unconditionally mark valid, as an explicit write does.
    pub(crate) fn validate(&self) {
        self.advance(|state| (state & !VALID).wrapping_add(EPOCH_STEP) | VALID);
    }

    fn advance(&self, next: impl Fn(u64) -> u64) -> u64 {
        match self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |state| Some(next(state)))
        {
            Ok(previous) | Err(previous) => previous,
        }
    }
}

/// Records which thread, if any, is pulling a cell's inputs.
#[derive(Debug, Default)]
pub(crate) struct Pull {
    thread: Mutex<Option<ThreadId>>,
}

impl Pull {
    /// Mark the current thread as pulling until the guard drops.
    pub(crate) fn begin(&self) -> PullGuard<'_> {
        let previous = self.thread.lock().replace(thread::current().id());
        PullGuard { pull: self, previous }
    }

    /// Whether the current thread is inside [`begin`](Pull::begin).
    pub(crate) fn is_current(&self) -> bool {
        *self.thread.lock() == Some(thread::current().id())
    }
}

/// Ends a pull, including when the computation panics.
pub(crate) struct PullGuard<'a> {
    pull: &'a Pull,
    previous: Option<ThreadId>,
}

impl Drop for PullGuard<'_> {
    fn drop(&mut self) {
        *self.pull.thread.lock() = self.previous.take();
    }
}

impl fmt::Debug for Validity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.load(Ordering::Acquire);
        f.debug_struct("Validity")
            .field("valid", &(state & VALID != 0))
            .field("epoch", &(state >> 1))
            .finish()
    }
}
