//! Bounded key→value store with per-entry expiry, backed by `moka`.
//!
//! Every entry lives at most `ttl` from the moment it was stored, regardless of how
//! often it is read or updated in place. When the store is full, moka evicts the least
//! recently used entry.
//!
//! Expiry is judged against the injected `Clock`. The same clock drives moka's own
//! per-entry deadline, so stale entries are also reclaimed without being touched again.

use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, Duration, Utc};
use moka::ops::compute;
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use moka::Expiry;

use crate::clock::Clock;

/// What `compute_with` should do with the entry after the closure ran.
#[derive(Debug)]
pub enum Op<V> {
    /// Keep the current value (including in-place changes) and its original creation time.
    Keep,
    /// Store this value with a fresh creation time.
    Put(V),
    /// Drop the key.
    Remove,
}

#[derive(Debug, Clone)]
struct Slot<V> {
    value: V,
    created_at: DateTime<Utc>,
}

impl<V> Slot<V> {
    fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.created_at > ttl
    }
}

/// Deadline measured from the slot's creation time, so in-place updates never extend it.
struct FromCreation {
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl FromCreation {
    fn remaining<V>(&self, slot: &Slot<V>) -> Option<StdDuration> {
        let left = self.ttl - (self.clock.now() - slot.created_at);
        Some(left.to_std().unwrap_or(StdDuration::ZERO))
    }
}

impl<V> Expiry<String, Slot<V>> for FromCreation {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Slot<V>,
        _created_at: Instant,
    ) -> Option<StdDuration> {
        self.remaining(value)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Slot<V>,
        _updated_at: Instant,
        _duration_until_expiry: Option<StdDuration>,
    ) -> Option<StdDuration> {
        self.remaining(value)
    }
}

pub struct BoundedTtlCache<V: Clone + Send + Sync + 'static> {
    entries: Cache<String, Slot<V>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl<V: Clone + Send + Sync + 'static> BoundedTtlCache<V> {
    pub fn new(capacity: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let entries = Cache::builder()
            .max_capacity(capacity.max(1) as u64)
            .eviction_policy(EvictionPolicy::lru())
            .expire_after(FromCreation {
                ttl,
                clock: clock.clone(),
            })
            .build();

        Self {
            entries,
            ttl,
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Returns a live value and marks it most recently used.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        self.entries
            .get(key)
            .filter(|slot| !slot.is_expired(now, self.ttl))
            .map(|slot| slot.value)
    }

    /// Creation time of a live entry.
    pub fn created_at(&self, key: &str) -> Option<DateTime<Utc>> {
        let now = self.clock.now();
        self.entries
            .get(key)
            .filter(|slot| !slot.is_expired(now, self.ttl))
            .map(|slot| slot.created_at)
    }

    pub fn insert(&self, key: &str, value: V) {
        let slot = Slot {
            value,
            created_at: self.clock.now(),
        };
        self.entries.insert(key.to_string(), slot);
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        self.entries
            .remove(key)
            .filter(|slot| !slot.is_expired(now, self.ttl))
            .map(|slot| slot.value)
    }

    /// Atomic read-modify-write for one key.
    ///
    /// `f` sees `None` when the key is absent or expired. Its `Op` decides what is
    /// stored afterwards; its second return value is handed back to the caller.
    pub fn compute_with<R, F>(&self, key: &str, f: F) -> R
    where
        F: FnOnce(Option<&mut V>) -> (Op<V>, R),
    {
        let now = self.clock.now();
        let ttl = self.ttl;
        let mut output = None;

        let _ = self
            .entries
            .entry(key.to_string())
            .and_compute_with(|current| {
                let live = current
                    .map(|entry| entry.into_value())
                    .filter(|slot| !slot.is_expired(now, ttl));

                let (op, out) = match live {
                    Some(mut slot) => {
                        let (op, out) = f(Some(&mut slot.value));
                        let op = match op {
                            Op::Keep => compute::Op::Put(slot),
                            Op::Put(value) => compute::Op::Put(Slot {
                                value,
                                created_at: now,
                            }),
                            Op::Remove => compute::Op::Remove,
                        };
                        (op, out)
                    }
                    None => {
                        let (op, out) = f(None);
                        let op = match op {
                            Op::Put(value) => compute::Op::Put(Slot {
                                value,
                                created_at: now,
                            }),
                            // an expired slot is dropped rather than kept
                            Op::Keep | Op::Remove => compute::Op::Remove,
                        };
                        (op, out)
                    }
                };

                output = Some(out);
                op
            });

        match output {
            Some(out) => out,
            None => unreachable!("and_compute_with runs its closure exactly once"),
        }
    }

    /// Entry count after moka has applied pending evictions.
    pub fn len(&self) -> usize {
        self.entries.run_pending_tasks();
        self.entries.entry_count() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn make_cache(capacity: usize, ttl: Duration) -> (BoundedTtlCache<u32>, Arc<ManualClock>) {
        let clock = ManualClock::shared(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        (BoundedTtlCache::new(capacity, ttl, clock.clone()), clock)
    }

    #[test]
    fn test_get_returns_inserted_value() {
        let (cache, _) = make_cache(10, Duration::hours(1));
        cache.insert("a", 7);
        assert_eq!(cache.get("a"), Some(7));
        assert_eq!(cache.get("b"), None);
    }

    #[test]
    fn test_entry_expires_after_ttl_from_creation() {
        let (cache, clock) = make_cache(10, Duration::hours(1));
        cache.insert("a", 1);

        clock.advance(Duration::minutes(59));
        assert_eq!(cache.get("a"), Some(1));

        clock.advance(Duration::minutes(2));
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn test_in_place_update_keeps_creation_time() {
        let (cache, clock) = make_cache(10, Duration::hours(1));
        cache.insert("a", 1);
        let created = cache.created_at("a").unwrap();

        clock.advance(Duration::minutes(30));
        cache.compute_with("a", |v| {
            *v.unwrap() += 1;
            (Op::Keep, ())
        });
        assert_eq!(cache.get("a"), Some(2));
        assert_eq!(cache.created_at("a"), Some(created));

        clock.advance(Duration::minutes(31));
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn test_put_restarts_ttl() {
        let (cache, clock) = make_cache(10, Duration::hours(1));
        cache.insert("a", 1);

        clock.advance(Duration::minutes(50));
        cache.insert("a", 2);

        clock.advance(Duration::minutes(50));
        assert_eq!(cache.get("a"), Some(2));
    }

    #[test]
    fn test_compute_with_sees_expired_entry_as_absent() {
        let (cache, clock) = make_cache(10, Duration::hours(1));
        cache.insert("a", 9);
        clock.advance(Duration::hours(2));

        let seen = cache.compute_with("a", |v| {
            let seen = v.map(|v| *v);
            (Op::Put(1), seen)
        });
        assert_eq!(seen, None);
        assert_eq!(cache.get("a"), Some(1));
    }

    #[test]
    fn test_compute_with_remove() {
        let (cache, _) = make_cache(10, Duration::hours(1));
        cache.insert("a", 1);
        cache.compute_with("a", |_| (Op::Remove, ()));
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.remove("a"), None);
    }

    #[test]
    fn test_evicts_least_recently_used_when_full() {
        let (cache, _) = make_cache(3, Duration::hours(1));
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("c", 3);
        assert_eq!(cache.len(), 3);

        // touch "a" so "b" becomes the oldest
        assert_eq!(cache.get("a"), Some(1));
        cache.entries.run_pending_tasks();

        cache.insert("d", 4);
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("d"), Some(4));
    }

    #[test]
    fn test_updating_existing_key_never_evicts() {
        let (cache, _) = make_cache(2, Duration::hours(1));
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("a", 10);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a"), Some(10));
        assert_eq!(cache.get("b"), Some(2));
    }

    #[test]
    fn test_capacity_stays_bounded_under_many_new_keys() {
        let (cache, _) = make_cache(100, Duration::hours(24));
        for i in 0..1_000 {
            cache.insert(&format!("10.0.{}.{}", i / 256, i % 256), i);
        }
        assert!(cache.len() <= 100);
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let (cache, _) = make_cache(0, Duration::hours(1));
        cache.insert("a", 1);
        cache.insert("b", 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_deadline_counts_from_creation() {
        let clock = ManualClock::shared(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        let expiry = FromCreation {
            ttl: Duration::hours(1),
            clock: clock.clone(),
        };
        let slot = Slot {
            value: 1u32,
            created_at: clock.now(),
        };
        assert_eq!(expiry.remaining(&slot), Some(StdDuration::from_secs(3600)));

        clock.advance(Duration::minutes(45));
        assert_eq!(expiry.remaining(&slot), Some(StdDuration::from_secs(900)));

        clock.advance(Duration::hours(2));
        assert_eq!(expiry.remaining(&slot), Some(StdDuration::ZERO));
    }
}
