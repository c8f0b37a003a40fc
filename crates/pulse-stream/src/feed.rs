//! Bounded, de-duplicated activity history built from stream updates.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::hash::Hash;

type KeyFn<T, K> = Box<dyn Fn(&T) -> K + Send + Sync>;

/// Newest-first history of items, keyed by a caller-supplied identity.
///
/// An item whose key is already present is dropped. Once `capacity` is
/// reached the oldest item is evicted, and its key may be accepted again.
pub struct ActivityFeed<T, K> {
    items: VecDeque<T>,
    keys: HashSet<K>,
    key_fn: KeyFn<T, K>,
    capacity: usize,
}

impl<T, K> ActivityFeed<T, K>
where
    K: Eq + Hash,
{
    pub fn new<F>(capacity: usize, key_fn: F) -> Self
    where
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            keys: HashSet::with_capacity(capacity),
            key_fn: Box::new(key_fn),
            capacity,
        }
    }

    /// Insert `item` at the front. Returns `false` for a duplicate.
    pub fn push(&mut self, item: T) -> bool {
        let key = (self.key_fn)(&item);
        if self.keys.contains(&key) {
            return false;
        }
        if self.items.len() == self.capacity {
            if let Some(evicted) = self.items.pop_back() {
                self.keys.remove(&(self.key_fn)(&evicted));
            }
        }
        self.keys.insert(key);
        self.items.push_front(item);
        true
    }

    /// Insert items oldest-first so the last one ends up newest.
    /// Returns how many were new.
    pub fn extend<I: IntoIterator<Item = T>>(&mut self, items: I) -> usize {
        let mut added = 0;
        for item in items {
            if self.push(item) {
                added += 1;
            }
        }
        added
    }

    pub fn contains(&self, key: &K) -> bool {
        self.keys.contains(key)
    }

    pub fn latest(&self) -> Option<&T> {
        self.items.front()
    }

    /// Items, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.keys.clear();
    }
}

impl<T: Clone, K> ActivityFeed<T, K> {
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

impl<T, K> fmt::Debug for ActivityFeed<T, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivityFeed")
            .field("len", &self.items.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
