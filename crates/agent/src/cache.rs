//! Bounded, clone-on-read cache keyed by canonical hashes.
//!
//! Used for LLM responses (keyed by a hash of the call's semantic inputs)
//! and for context packs (keyed by context hash). Entries are evicted in
//! insertion order once capacity is reached. Readers always get their own
//! copy, so mutating a returned value never touches the cached one.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

pub struct BoundedCache<V: Clone> {
    capacity: usize,
    inner: Mutex<Inner<V>>,
}

struct Inner<V> {
    entries: HashMap<String, V>,
    order: VecDeque<String>,
}

impl<V: Clone> BoundedCache<V> {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// A clone of the cached value, if present.
    pub fn get(&self, key: &str) -> Option<V> {
        self.lock().entries.get(key).cloned()
    }

    /// Insert or replace a value, evicting the oldest entry when full.
    pub fn insert(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        let mut inner = self.lock();
        if inner.entries.insert(key.clone(), value).is_some() {
            return;
        }
        inner.order.push_back(key);
        while inner.order.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.entries.remove(&oldest);
            }
        }
    }

    /// Insert unless the key is present. Returns whichever value is cached
    /// afterwards, so concurrent writers all observe the first one.
    pub fn insert_if_absent(&self, key: impl Into<String>, value: V) -> V {
        let key = key.into();
        let mut inner = self.lock();
        if let Some(existing) = inner.entries.get(&key) {
            return existing.clone();
        }
        inner.entries.insert(key.clone(), value.clone());
        inner.order.push_back(key);
        while inner.order.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.entries.remove(&oldest);
            }
        }
        value
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every entry. Test reset hook.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.order.clear();
    }
}
