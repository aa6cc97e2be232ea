//! Per-page like/view ledger.
//!
//! Pages are tracked in a sharded concurrent map keyed by page reference, so
//! interactions on unrelated pages never contend. Client identifiers are
//! hashed by [`HashIdentity`] *before* any shard lock is taken; once a handle
//! is memoized the expensive derivation never runs under a ledger lock.

pub mod recorder;
pub mod store;

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;

use crate::identity::HashIdentity;

/// Like/view handle sets for one page reference.
#[derive(Debug, Default, Clone)]
pub struct InteractionSet {
    pub liked: HashSet<String>,
    pub viewed: HashSet<String>,
}

/// A point-in-time copy of the whole ledger, taken for persistence.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct LedgerSnapshot {
    pub likes: Vec<(String, Vec<String>)>,
    pub views: Vec<(String, Vec<String>)>,
}

pub struct InteractionLedger {
    identity: Arc<HashIdentity>,
    pages: DashMap<String, InteractionSet>,
}

impl InteractionLedger {
    pub fn new(identity: Arc<HashIdentity>) -> Self {
        Self {
            identity,
            pages: DashMap::new(),
        }
    }

    /// Seed the ledger from persisted (page reference, handle) pairs.
    /// Each set is filled strictly from its own table.
    pub fn hydrate(&self, likes: Vec<(String, String)>, views: Vec<(String, String)>) {
        for (page, handle) in likes {
            self.pages.entry(page).or_default().liked.insert(handle);
        }
        for (page, handle) in views {
            self.pages.entry(page).or_default().viewed.insert(handle);
        }
    }

    /// Record a like. Returns whether the handle had already liked the page;
    /// repeated calls never change the set size.
    pub fn like_on(&self, raw_id: &str, page: &str) -> bool {
        let handle = self.identity.handle(raw_id);
        let mut entry = self.pages.entry(page.to_string()).or_default();
        !entry.liked.insert(handle)
    }

    /// Remove a like. Returns true when the handle was already absent.
    pub fn like_off(&self, raw_id: &str, page: &str) -> bool {
        let handle = self.identity.handle(raw_id);
        match self.pages.get_mut(page) {
            Some(mut entry) => !entry.liked.remove(&handle),
            None => true,
        }
    }

    pub fn like_status(&self, raw_id: &str, page: &str) -> bool {
        let handle = self.identity.handle(raw_id);
        self.pages
            .get(page)
            .is_some_and(|entry| entry.liked.contains(&handle))
    }

    pub fn like_count(&self, page: &str) -> usize {
        self.pages.get(page).map_or(0, |entry| entry.liked.len())
    }

    /// Record a view. Unconditional insert; the caller treats this as
    /// fire-and-forget bookkeeping.
    pub fn view(&self, raw_id: &str, page: &str) {
        let handle = self.identity.handle(raw_id);
        self.pages
            .entry(page.to_string())
            .or_default()
            .viewed
            .insert(handle);
    }

    pub fn view_status(&self, raw_id: &str, page: &str) -> bool {
        let handle = self.identity.handle(raw_id);
        self.pages
            .get(page)
            .is_some_and(|entry| entry.viewed.contains(&handle))
    }

    pub fn view_count(&self, page: &str) -> usize {
        self.pages.get(page).map_or(0, |entry| entry.viewed.len())
    }

    /// Copy the current state for persistence. The result is a snapshot:
    /// interactions recorded after this call are not reflected in it.
    pub fn snapshot(&self) -> LedgerSnapshot {
        let mut snapshot = LedgerSnapshot::default();
        for entry in self.pages.iter() {
            let page = entry.key().clone();
            if !entry.liked.is_empty() {
                let mut handles: Vec<String> = entry.liked.iter().cloned().collect();
                handles.sort();
                snapshot.likes.push((page.clone(), handles));
            }
            if !entry.viewed.is_empty() {
                let mut handles: Vec<String> = entry.viewed.iter().cloned().collect();
                handles.sort();
                snapshot.views.push((page, handles));
            }
        }
        snapshot.likes.sort_by(|a, b| a.0.cmp(&b.0));
        snapshot.views.sort_by(|a, b| a.0.cmp(&b.0));
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Instant;

    use super::*;

    fn ledger() -> InteractionLedger {
        let identity = Arc::new(HashIdentity::new(b"0123456789abcdef".to_vec()).expect("identity"));
        InteractionLedger::new(identity)
    }

    #[test]
    fn like_on_is_idempotent() {
        let ledger = ledger();
        assert!(!ledger.like_on("10.0.0.1", "my-post"));
        let count = ledger.like_count("my-post");
        assert!(ledger.like_on("10.0.0.1", "my-post"));
        assert_eq!(ledger.like_count("my-post"), count);
        assert_eq!(count, 1);
    }

    #[test]
    fn like_off_is_idempotent() {
        let ledger = ledger();
        ledger.like_on("10.0.0.1", "my-post");
        assert!(!ledger.like_off("10.0.0.1", "my-post"));
        assert!(ledger.like_off("10.0.0.1", "my-post"));
        assert!(ledger.like_off("10.0.0.1", "unknown-post"));
        assert_eq!(ledger.like_count("my-post"), 0);
    }

    #[test]
    fn views_accumulate_per_handle() {
        let ledger = ledger();
        ledger.view("10.0.0.1", "my-post");
        ledger.view("10.0.0.1", "my-post");
        ledger.view("10.0.0.2", "my-post");
        assert_eq!(ledger.view_count("my-post"), 2);
        assert!(ledger.view_status("10.0.0.1", "my-post"));
        assert!(!ledger.view_status("10.0.0.3", "my-post"));
    }

    #[test]
    fn snapshot_is_detached_from_later_writes() {
        let ledger = ledger();
        ledger.like_on("10.0.0.1", "a");
        let snapshot = ledger.snapshot();
        ledger.like_on("10.0.0.2", "a");
        assert_eq!(snapshot.likes.len(), 1);
        assert_eq!(snapshot.likes[0].1.len(), 1);
    }

    #[test]
    fn hydrate_reproduces_exact_sets() {
        let ledger = ledger();
        ledger.hydrate(
            vec![
                ("a".into(), "h1".into()),
                ("a".into(), "h2".into()),
                ("b".into(), "h3".into()),
            ],
            vec![("a".into(), "h1".into())],
        );
        assert_eq!(ledger.like_count("a"), 2);
        assert_eq!(ledger.like_count("b"), 1);
        assert_eq!(ledger.view_count("a"), 1);
        assert_eq!(ledger.view_count("b"), 0);
    }

    // A page whose clients still need hashing must not delay memoized
    // operations on another page: derivation runs before any shard lock and
    // outside the identity map lock.
    #[test]
    fn distinct_pages_do_not_serialize() {
        let identity = Arc::new(HashIdentity::new(b"0123456789abcdef".to_vec()).expect("identity"));
        let ledger = Arc::new(InteractionLedger::new(identity));

        // Memoize the fast page's client, then time one cold derivation as
        // the comparison baseline.
        ledger.view("10.1.0.1", "warm");
        let baseline = Instant::now();
        ledger.view("10.1.0.2", "warm");
        let one_cold_derivation = baseline.elapsed();

        // Cold ids keep page-one hashing while page-two runs memoized.
        let cold_worker = {
            let ledger = ledger.clone();
            thread::spawn(move || {
                for i in 0..3 {
                    ledger.like_on(&format!("10.1.1.{i}"), "page-one");
                }
            })
        };

        let start = Instant::now();
        for _ in 0..2_000 {
            ledger.like_on("10.1.0.1", "page-two");
            ledger.like_off("10.1.0.1", "page-two");
        }
        let warm_elapsed = start.elapsed();
        cold_worker.join().expect("join hashing worker");

        // All 4000 memoized operations together finish faster than a single
        // argon2 derivation; waiting on page-one's hashing would blow that.
        assert!(
            warm_elapsed < one_cold_derivation,
            "memoized page waited on cold hashing: {warm_elapsed:?} vs {one_cold_derivation:?}"
        );
        assert_eq!(ledger.like_count("page-one"), 3);
        assert_eq!(ledger.like_count("page-two"), 0);
    }
}
