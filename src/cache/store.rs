//! Cost-bounded, TTL-based byte store backing the fragment cache.
//!
//! Eviction is approximate: expired entries are dropped on access, and
//! over-budget inserts evict from the LRU end until the new entry fits.
//! Nothing here promises that a stored key stays present until its expiry.

use std::num::NonZeroUsize;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use bytes::Bytes;
use lru::LruCache;
use metrics::counter;

use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::store";

// Entry-count ceiling; the effective bound is the cost budget.
const ENTRY_CAP: usize = 1 << 16;

#[derive(Clone)]
struct FragmentEntry {
    payload: Bytes,
    cost: u64,
    expires_at: Instant,
}

struct Inner {
    entries: LruCache<String, FragmentEntry>,
    total_cost: u64,
}

/// In-memory store for rendered fragments.
pub struct FragmentStore {
    inner: RwLock<Inner>,
    max_cost: u64,
}

impl FragmentStore {
    pub fn new(max_cost: u64) -> Self {
        let cap = NonZeroUsize::new(ENTRY_CAP).expect("entry cap is non-zero");
        Self {
            inner: RwLock::new(Inner {
                entries: LruCache::new(cap),
                total_cost: 0,
            }),
            max_cost,
        }
    }

    /// Fetch a fragment, dropping it instead when its TTL has passed.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        let mut inner = rw_write(&self.inner, SOURCE, "get");
        match inner.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => {
                counter!("brezza_fragment_cache_hit_total").increment(1);
                Some(entry.payload.clone())
            }
            Some(_) => {
                if let Some(expired) = inner.entries.pop(key) {
                    inner.total_cost = inner.total_cost.saturating_sub(expired.cost);
                }
                counter!("brezza_fragment_cache_miss_total").increment(1);
                None
            }
            None => {
                counter!("brezza_fragment_cache_miss_total").increment(1);
                None
            }
        }
    }

    /// Insert a fragment, evicting least-recently-used entries until the
    /// cost budget holds. Entries dearer than the whole budget are refused.
    pub fn set_with_ttl(&self, key: String, payload: Bytes, cost: u64, ttl: Duration) {
        if cost > self.max_cost {
            counter!("brezza_fragment_cache_admission_refused_total").increment(1);
            return;
        }

        let mut inner = rw_write(&self.inner, SOURCE, "set_with_ttl");

        if let Some(previous) = inner.entries.pop(&key) {
            inner.total_cost = inner.total_cost.saturating_sub(previous.cost);
        }

        while inner.total_cost + cost > self.max_cost {
            match inner.entries.pop_lru() {
                Some((_, evicted)) => {
                    inner.total_cost = inner.total_cost.saturating_sub(evicted.cost);
                    counter!("brezza_fragment_cache_evict_total").increment(1);
                }
                None => break,
            }
        }

        inner.total_cost += cost;
        inner.entries.put(
            key,
            FragmentEntry {
                payload,
                cost,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn len(&self) -> usize {
        rw_read(&self.inner, SOURCE, "len").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
