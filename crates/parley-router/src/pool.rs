//! Object pool for per-event values.
//!
//! Values are handed out as [`Pooled`] guards around a uniquely owned
//! `Arc<T>`. While the guard is alive the value can be shared (handlers and
//! middleware receive `Arc` clones); when the guard drops, the value is
//! reset and returned to the pool.
//!
//! Returning a value is only possible through the guard, so a reset can
//! never be skipped. If a clone of the `Arc` is still alive at that point
//! (something retained the value past its dispatch) the value is discarded
//! instead of being reused.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::warn;

/// Values that can be cleared for reuse.
pub trait Reset {
    /// Clears all per-use state.
    fn reset(&mut self);

    /// Ends the current use of a value that is still shared and will not
    /// come back to the pool.
    fn retire(&self) {}
}

type Factory<T> = Box<dyn Fn() -> T + Send + Sync>;

/// A concurrency-safe pool of reusable values.
pub struct Pool<T: Reset> {
    idle: Mutex<Vec<Arc<T>>>,
    factory: Factory<T>,
    created: AtomicUsize,
    discarded: AtomicUsize,
}

impl<T: Reset> Pool<T> {
    /// Creates an empty pool. Values are built by `factory` on demand.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            idle: Mutex::new(Vec::new()),
            factory: Box::new(factory),
            created: AtomicUsize::new(0),
            discarded: AtomicUsize::new(0),
        }
    }

    /// Takes an idle value, or builds a new one.
    pub fn acquire(&self) -> Pooled<'_, T> {
        let value = self.idle.lock().pop().unwrap_or_else(|| {
            self.created.fetch_add(1, Ordering::Relaxed);
            Arc::new((self.factory)())
        });
        Pooled {
            pool: self,
            value: Some(value),
        }
    }

    /// Number of values waiting in the pool.
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }

    /// Number of values the factory has built so far.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    /// Number of values dropped because they were still shared on release.
    pub fn discarded(&self) -> usize {
        self.discarded.load(Ordering::Relaxed)
    }

    fn release(&self, mut value: Arc<T>) {
        match Arc::get_mut(&mut value) {
            Some(inner) => {
                inner.reset();
                self.idle.lock().push(value);
            }
            None => {
                value.retire();
                self.discarded.fetch_add(1, Ordering::Relaxed);
                warn!(
                    strong_count = Arc::strong_count(&value),
                    "Pooled value still referenced on release, discarding it"
                );
            }
        }
    }
}

impl<T: Reset> std::fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("idle", &self.idle())
            .field("created", &self.created())
            .field("discarded", &self.discarded())
            .finish()
    }
}

/// A value borrowed from a [`Pool`]. Resets and returns the value on drop.
pub struct Pooled<'a, T: Reset> {
    pool: &'a Pool<T>,
    value: Option<Arc<T>>,
}

impl<T: Reset> Pooled<'_, T> {
    /// Mutable access, available only while no clone has been shared.
    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.value.as_mut().and_then(Arc::get_mut)
    }

    /// Shared access for the duration of one use.
    pub fn share(&self) -> Option<Arc<T>> {
        self.value.clone()
    }
}

impl<T: Reset> Drop for Pooled<'_, T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.pool.release(value);
        }
    }
}
