//! Checkout/checkin pools for reusable per-request resources.
//!
//! A [`Pool`] hands out items wrapped in a [`Pooled`] guard. The guard gives the
//! holder exclusive access and, when dropped, resets the item through
//! [`Recycle`] before putting it back on the free list. The free list is the
//! only shared state, so checkout and checkin are the only places that lock.

use parking_lot::Mutex;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Resets an item to a fresh state before it re-enters its pool.
pub trait Recycle {
    /// Drops per-use state so the next holder cannot observe it.
    fn recycle(&mut self);
}

/// An unbounded, lazily-filled pool of reusable items.
///
/// Items are created on demand when the free list is empty and kept after
/// use; nothing is ever evicted.
pub struct Pool<T> {
    idle: Mutex<Vec<T>>,
    make: Box<dyn Fn() -> T + Send + Sync>,
}

impl<T: Recycle> Pool<T> {
    /// Creates an empty pool that builds new items with `make`.
    pub fn new<F>(make: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            idle: Mutex::new(Vec::new()),
            make: Box::new(make),
        }
    }

    /// Checks out an idle item, or builds a new one if none is idle.
    pub fn acquire(self: &Arc<Self>) -> Pooled<T> {
        // The lock guard is dropped before `make` runs.
        let idle = self.idle.lock().pop();
        let item = idle.unwrap_or_else(|| (self.make)());

        Pooled {
            item: Some(item),
            pool: Arc::clone(self),
        }
    }

    /// Returns the number of items currently waiting in the free list.
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }

    fn release(&self, mut item: T) {
        item.recycle();
        self.idle.lock().push(item);
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("idle", &self.idle.lock().len())
            .finish()
    }
}

/// An item checked out of a [`Pool`]; dropping it checks the item back in.
pub struct Pooled<T: Recycle> {
    item: Option<T>,
    pool: Arc<Pool<T>>,
}

impl<T: Recycle> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.item.as_ref().expect("pooled item taken only in drop")
    }
}

impl<T: Recycle> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.item.as_mut().expect("pooled item taken only in drop")
    }
}

impl<T: Recycle> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(item) = self.item.take() {
            self.pool.release(item);
        }
    }
}

impl<T: Recycle + fmt::Debug> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pooled").field(&**self).finish()
    }
}
