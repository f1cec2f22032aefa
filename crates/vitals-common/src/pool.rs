//! A typed free-list for reusable objects on hot allocation sites.

use std::sync::Mutex;

/// Capability required of pooled objects: return to a clean state while
/// keeping allocated capacity.
pub trait Reset {
    fn reset(&mut self);
}

/// A thread-safe pool of reusable `T`s.
///
/// [`Pool::release`] resets the object before caching it, so everything
/// handed out by [`Pool::acquire`] is either freshly constructed or freshly
/// reset. Objects never move between pools of different types.
///
/// # Examples
///
/// ```
/// use vitals_common::pool::Pool;
///
/// let pool: Pool<Vec<u8>> = Pool::new(Vec::new);
/// let mut buf = pool.acquire();
/// buf.extend_from_slice(b"scratch");
/// pool.release(buf);
///
/// // Round-tripped buffers come back empty.
/// assert!(pool.acquire().is_empty());
/// ```
pub struct Pool<T: Reset> {
    items: Mutex<Vec<T>>,
    factory: Box<dyn Fn() -> T + Send + Sync>,
}

impl<T: Reset> Pool<T> {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            items: Mutex::new(Vec::new()),
            factory: Box::new(factory),
        }
    }

    /// Takes a cached object, or constructs one when the cache is empty.
    pub fn acquire(&self) -> T {
        if let Some(item) = self.items.lock().unwrap().pop() {
            return item;
        }
        (self.factory)()
    }

    /// Resets the object and returns it to the cache.
    pub fn release(&self, mut item: T) {
        item.reset();
        self.items.lock().unwrap().push(item);
    }

    #[cfg(test)]
    fn cached(&self) -> usize {
        self.items.lock().unwrap().len()
    }
}

impl Reset for Vec<u8> {
    fn reset(&mut self) {
        self.clear();
    }
}

impl Reset for String {
    fn reset(&mut self) {
        self.clear();
    }
}
