//! Locked FIFO of protocol work items.
//!
//! Only the head item is ever active. The owner of a queue drives it from a
//! single thread while other threads push new work or cancel queued items,
//! all under the same lock.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Identity of a queued work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkId(u64);

/// Monotonic [`WorkId`] allocator.
#[derive(Debug, Default)]
pub struct WorkIds {
    next: AtomicU64,
}

impl WorkIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> WorkId {
        WorkId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// FIFO guarded by a mutex.
#[derive(Debug)]
pub struct WorkQueue<T> {
    items: Mutex<VecDeque<T>>,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
        }
    }
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_back(&self, item: T) {
        self.lock().push_back(item);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Take the lock for a compound operation.
    pub fn lock(&self) -> WorkQueueGuard<'_, T> {
        WorkQueueGuard {
            items: self.items.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }
}

/// Exclusive access to a [`WorkQueue`] while held.
pub struct WorkQueueGuard<'a, T> {
    items: MutexGuard<'a, VecDeque<T>>,
}

impl<T> WorkQueueGuard<'_, T> {
    pub fn push_back(&mut self, item: T) {
        self.items.push_back(item);
    }

    pub fn front(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn front_mut(&mut self) -> Option<&mut T> {
        self.items.front_mut()
    }

    pub fn pop_front(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    /// Remove and return the first item matching `predicate`.
    pub fn remove_first<P>(&mut self, predicate: P) -> Option<T>
    where
        P: FnMut(&T) -> bool,
    {
        let index = self.items.iter().position(predicate)?;
        self.items.remove(index)
    }

    /// Remove every item, front to back.
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.items.drain(..)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
