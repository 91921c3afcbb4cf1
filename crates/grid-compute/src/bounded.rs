// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded insertion-ordered structures backing `finished` and `cancelReqs`
//! (spec.md §3, design note "Concurrent maps with ordering").
//!
//! Both are modeled as a ring of insertion order plus a side index for O(1)
//! membership: eviction is strictly by insertion time, never by access or
//! size-lookup (spec.md I2).

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;

struct Ring<K> {
    order: VecDeque<K>,
    capacity: usize,
}

impl<K: Eq + Hash + Clone> Ring<K> {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Pushes `key` to the back and returns the oldest key evicted to make
    /// room, if any.
    fn push(&mut self, key: K) -> Option<K> {
        self.order.push_back(key);
        if self.order.len() > self.capacity {
            self.order.pop_front()
        } else {
            None
        }
    }
}

/// A bounded, insertion-ordered set. Used for the scheduler's `finished`
/// window (default capacity 10,240, spec.md §3).
pub struct BoundedOrderedSet<K> {
    ring: Mutex<Ring<K>>,
    members: Mutex<HashSet<K>>,
}

impl<K: Eq + Hash + Clone> BoundedOrderedSet<K> {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: Mutex::new(Ring::new(capacity.max(1))),
            members: Mutex::new(HashSet::new()),
        }
    }

    /// Records `key` as finished. Idempotent: re-inserting an already
    /// present key does not reorder it or evict anything.
    pub fn insert(&self, key: K) {
        let mut members = self.members.lock();
        if !members.insert(key.clone()) {
            return;
        }
        drop(members);
        if let Some(evicted) = self.ring.lock().push(key) {
            self.members.lock().remove(&evicted);
        }
    }

    pub fn contains(&self, key: &K) -> bool {
        self.members.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.members.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A point-in-time copy of every member currently held, for read-model
    /// views (e.g. `SchedulerView`) that need to enumerate rather than just
    /// test membership.
    pub fn snapshot(&self) -> Vec<K> {
        self.members.lock().iter().cloned().collect()
    }
}

/// A bounded, insertion-ordered map. Used for `cancelReqs`, keyed by job or
/// session id with a "system-initiated?" boolean value (spec.md §3).
pub struct BoundedOrderedMap<K, V> {
    ring: Mutex<Ring<K>>,
    entries: Mutex<HashMap<K, V>>,
}

impl<K: Eq + Hash + Clone, V: Clone> BoundedOrderedMap<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: Mutex::new(Ring::new(capacity.max(1))),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Inserts or overwrites `key`'s value. A fresh key is appended to the
    /// insertion order and may evict the oldest entry; overwriting an
    /// existing key leaves its position in the order untouched.
    pub fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.lock();
        let is_new = !entries.contains_key(&key);
        entries.insert(key.clone(), value);
        drop(entries);
        if is_new {
            if let Some(evicted) = self.ring.lock().push(key) {
                self.entries.lock().remove(&evicted);
            }
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.lock().get(key).cloned()
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.lock().remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_set_evicts_strictly_by_insertion_order() {
        let set = BoundedOrderedSet::new(2);
        set.insert(1);
        set.insert(2);
        assert!(set.contains(&1));
        set.insert(3);
        assert!(!set.contains(&1), "oldest entry must be evicted first");
        assert!(set.contains(&2));
        assert!(set.contains(&3));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn bounded_set_insert_is_idempotent() {
        let set = BoundedOrderedSet::new(2);
        set.insert(1);
        set.insert(1);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn bounded_map_evicts_oldest_key_not_most_recently_read() {
        let map = BoundedOrderedMap::new(2);
        map.insert("a", true);
        map.insert("b", false);
        // Reading "a" must not protect it from eviction -- order is by
        // insertion time only.
        assert_eq!(map.get(&"a"), Some(true));
        map.insert("c", true);
        assert_eq!(map.get(&"a"), None);
        assert_eq!(map.get(&"b"), Some(false));
        assert_eq!(map.get(&"c"), Some(true));
    }

    #[test]
    fn bounded_map_overwrite_does_not_reorder() {
        let map = BoundedOrderedMap::new(2);
        map.insert(1, "first");
        map.insert(2, "second");
        map.insert(1, "first-updated");
        map.insert(3, "third");
        // 1 was the oldest insertion despite being overwritten later, so it
        // is still the one evicted.
        assert_eq!(map.get(&1), None);
        assert_eq!(map.get(&2), Some("second"));
        assert_eq!(map.get(&3), Some("third"));
    }
}
