//! Bounded, time-expiring set of recently seen message identifiers.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Dedup cache for message identities.
///
/// `add` records a key with the current time and evicts the oldest entry
/// whenever the size exceeds the capacity, independent of expiry. `contains`
/// answers true only while the key's age is within the TTL; an expired hit
/// is removed as a side effect. There is no background sweep.
///
/// Single-writer, single-reader: the supervisor loop is the only intended
/// user. Sharing across threads requires external locking.
#[derive(Debug)]
pub struct DedupCache {
    capacity: usize,
    ttl: Duration,
    entries: HashMap<String, Instant>,
    // Insertion order, including stale markers for re-added or lazily
    // expired keys; eviction skips markers whose timestamp no longer
    // matches the live entry.
    order: VecDeque<(String, Instant)>,
}

impl DedupCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Record `key` as seen now. Re-adding refreshes its age and its place
    /// in the eviction order.
    pub fn add(&mut self, key: impl Into<String>) {
        self.add_at(key.into(), Instant::now());
    }

    /// True iff `key` was added within the TTL.
    pub fn contains(&mut self, key: &str) -> bool {
        self.contains_at(key, Instant::now())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn add_at(&mut self, key: String, now: Instant) {
        self.entries.insert(key.clone(), now);
        self.order.push_back((key, now));
        while self.entries.len() > self.capacity {
            let Some((key, at)) = self.order.pop_front() else {
                break;
            };
            if self.entries.get(&key) == Some(&at) {
                self.entries.remove(&key);
            }
        }
    }

    pub(crate) fn contains_at(&mut self, key: &str, now: Instant) -> bool {
        match self.entries.get(key) {
            Some(&at) if now.duration_since(at) <= self.ttl => true,
            Some(_) => {
                // lazy expiry
                self.entries.remove(key);
                false
            }
            None => false,
        }
    }
}
