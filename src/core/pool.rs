//! Reusable-object pool with automatic return on release
//!
//! Amortizes allocation cost for [`Message`] objects shared between the
//! network tasks and application consumers. [`Pool::obtain`] hands out a
//! [`Pooled`] guard; dropping the guard pushes the raw object back onto the
//! free list, where any task can obtain it again. An object is therefore
//! either in flight behind exactly one guard or sitting in the free list,
//! never both.
//!
//! The free list sits behind a plain mutex. Unlike the recursive-lock design
//! this replaces, a guard's drop can only run after `obtain()` has released
//! the lock, so there is no reentrancy to account for.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

use crate::core::message::Message;

type Allocator<T> = Box<dyn Fn() -> T + Send + Sync>;
type Cleaner<T> = Box<dyn Fn(&mut T) + Send + Sync>;

struct PoolState<T> {
    free: Mutex<Vec<T>>,
}

/// Object pool with a configurable allocator and cleaner
///
/// Cloning a `Pool` yields another handle to the same free list.
pub struct Pool<T> {
    state: Arc<PoolState<T>>,
    allocator: Arc<Allocator<T>>,
    cleaner: Arc<Cleaner<T>>,
}

impl<T> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            allocator: Arc::clone(&self.allocator),
            cleaner: Arc::clone(&self.cleaner),
        }
    }
}

impl<T> Pool<T> {
    /// Create a pool from an allocator and a cleaner
    ///
    /// The allocator builds a new object when the free list is empty; the
    /// cleaner restores a recycled object to a fresh logical state before it
    /// is handed out.
    pub fn new<A, C>(allocator: A, cleaner: C) -> Self
    where
        A: Fn() -> T + Send + Sync + 'static,
        C: Fn(&mut T) + Send + Sync + 'static,
    {
        Self {
            state: Arc::new(PoolState {
                free: Mutex::new(Vec::new()),
            }),
            allocator: Arc::new(Box::new(allocator)),
            cleaner: Arc::new(Box::new(cleaner)),
        }
    }

    /// Take an object from the pool, allocating when the free list is empty
    ///
    /// The cleaner runs on every object handed out, recycled or fresh, so
    /// callers always observe the same initial state.
    pub fn obtain(&self) -> Pooled<T> {
        let recycled = self.state.free.lock().pop();
        let mut value = recycled.unwrap_or_else(|| (self.allocator)());
        (self.cleaner)(&mut value);
        Pooled {
            value: Some(value),
            state: Arc::clone(&self.state),
        }
    }

    /// Pre-allocate until the free list holds `target` objects
    ///
    /// Never destroys in-flight objects; a target below the current free-list
    /// size leaves the pool unchanged.
    pub fn resize(&self, target: usize) {
        let mut free = self.state.free.lock();
        while free.len() < target {
            free.push((self.allocator)());
        }
    }

    /// Number of objects currently sitting in the free list
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.free.lock().len()
    }

    /// True when no objects are available without allocating
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.free.lock().is_empty()
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool").field("free", &self.len()).finish()
    }
}

/// Pool of [`Message`] objects
pub type MessagePool = Pool<Message>;

/// Pooled [`Message`] handle, returned to its pool on drop
pub type PooledMessage = Pooled<Message>;

impl Pool<Message> {
    /// Pool wired for messages: fresh objects come from [`Message::new`],
    /// recycled ones are scrubbed by [`Message::reset`]
    #[must_use]
    pub fn for_messages() -> Self {
        Pool::new(Message::new, Message::reset)
    }
}

/// RAII guard over a pool-owned object
///
/// Exclusive owner of the object while alive; dropping it (explicitly or by
/// going out of scope) returns the object to the pool's free list.
pub struct Pooled<T> {
    value: Option<T>,
    state: Arc<PoolState<T>>,
}

impl<T> std::ops::Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        // Invariant: value is Some between obtain() and Drop::drop()
        self.value
            .as_ref()
            .expect("Pooled invariant violated: value is None before Drop")
    }
}

impl<T> std::ops::DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // Invariant: value is Some between obtain() and Drop::drop()
        self.value
            .as_mut()
            .expect("Pooled invariant violated: value is None before Drop")
    }
}

impl<T> Drop for Pooled<T> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.state.free.lock().push(value);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Pooled<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pooled").field(&self.value).finish()
    }
}
