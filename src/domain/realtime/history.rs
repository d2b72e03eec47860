//! Fixed-capacity, most-recent-first event history.
//!
//! ```text
//!   push(e5)
//!     │
//!     ▼
//!   [e5, e4, e3, e2, e1]  ── capacity 5
//!   push(e6) evicts e1:
//!   [e6, e5, e4, e3, e2]
//! ```

use std::collections::VecDeque;

use crate::domain::foundation::Timestamp;

/// Default number of notifications kept by the shared connection.
pub const NOTIFICATION_HISTORY_CAPACITY: usize = 20;

/// Default number of session updates kept by the shared connection.
pub const SESSION_UPDATE_HISTORY_CAPACITY: usize = 50;

/// One retained item plus the moment it entered the buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry<T> {
    pub item: T,
    pub inserted_at: Timestamp,
}

/// Strict FIFO window over the last `capacity` items.
///
/// Iteration order is most-recent-first. Capacity never grows.
#[derive(Debug, Clone)]
pub struct BoundedHistoryBuffer<T> {
    entries: VecDeque<HistoryEntry<T>>,
    capacity: usize,
}

impl<T> BoundedHistoryBuffer<T> {
    /// Creates an empty buffer. A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Inserts at the front, evicting the oldest entry when full.
    ///
    /// Returns the evicted item, if any.
    pub fn push(&mut self, item: T) -> Option<T> {
        self.push_at(item, Timestamp::now())
    }

    /// Same as [`push`](Self::push) with an explicit insertion time.
    pub fn push_at(&mut self, item: T, inserted_at: Timestamp) -> Option<T> {
        self.entries.push_front(HistoryEntry { item, inserted_at });
        if self.entries.len() > self.capacity {
            self.entries.pop_back().map(|entry| entry.item)
        } else {
            None
        }
    }

    /// Most recently inserted item matching `predicate`.
    pub fn latest<P>(&self, mut predicate: P) -> Option<&T>
    where
        P: FnMut(&T) -> bool,
    {
        self.entries
            .iter()
            .map(|entry| &entry.item)
            .find(|item| predicate(item))
    }

    /// All items matching `predicate`, most-recent-first.
    pub fn all<P>(&self, mut predicate: P) -> Vec<&T>
    where
        P: FnMut(&T) -> bool,
    {
        self.entries
            .iter()
            .map(|entry| &entry.item)
            .filter(|item| predicate(item))
            .collect()
    }

    /// Items, most-recent-first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|entry| &entry.item)
    }

    /// Entries with their insertion times, most-recent-first.
    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry<T>> {
        self.entries.iter()
    }

    /// Removes the item at `index` (0 = most recent).
    pub fn remove(&mut self, index: usize) -> Option<T> {
        self.entries.remove(index).map(|entry| entry.item)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T: Clone> BoundedHistoryBuffer<T> {
    /// Owned copies of all matching items, most-recent-first.
    pub fn snapshot<P>(&self, predicate: P) -> Vec<T>
    where
        P: FnMut(&T) -> bool,
    {
        self.all(predicate).into_iter().cloned().collect()
    }
}
