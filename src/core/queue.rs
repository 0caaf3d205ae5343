//! Concurrent FIFO deque for message hand-off
//!
//! Hands pooled messages between the network tasks and application
//! consumers. Push and pop are linearizable under a single mutex; a
//! [`Notify`] wakes one waiter per push so `wait()` returns promptly after
//! the queue becomes non-empty.

use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::Notify;

use crate::core::pool::PooledMessage;

/// Queue of pooled messages shared between network and consumer tasks
pub type MessageQueue = SharedQueue<PooledMessage>;

/// Thread-safe FIFO deque with an async wait for non-emptiness
///
/// Popping from an empty queue returns `None` rather than blocking or
/// panicking; consumers that want to block call [`wait`](SharedQueue::wait)
/// first and re-check, tolerating spurious wakeups.
#[derive(Debug, Default)]
pub struct SharedQueue<T> {
    items: Mutex<VecDeque<T>>,
    notify: Notify,
}

impl<T> SharedQueue<T> {
    /// Create an empty queue
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    /// Append an entry at the back, waking one waiter
    pub fn push_back(&self, item: T) {
        self.items.lock().push_back(item);
        self.notify.notify_one();
    }

    /// Insert an entry at the front, waking one waiter
    pub fn push_front(&self, item: T) {
        self.items.lock().push_front(item);
        self.notify.notify_one();
    }

    /// Remove and return the front entry, `None` when empty
    pub fn pop_front(&self) -> Option<T> {
        self.items.lock().pop_front()
    }

    /// Remove and return the back entry, `None` when empty
    pub fn pop_back(&self) -> Option<T> {
        self.items.lock().pop_back()
    }

    /// Drop every entry
    ///
    /// Entries are released under ordinary ownership rules; pooled handles
    /// return to their pool.
    pub fn clear(&self) {
        self.items.lock().clear();
    }

    /// Number of queued entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// True when no entries are queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Wait until the queue is non-empty
    ///
    /// May return while the queue is already drained again by a concurrent
    /// consumer; callers re-check with [`pop_front`](SharedQueue::pop_front).
    pub async fn wait(&self) {
        loop {
            // Register interest before the emptiness check so a push between
            // the check and the await still wakes us.
            let notified = self.notify.notified();
            if !self.is_empty() {
                return;
            }
            notified.await;
        }
    }
}
