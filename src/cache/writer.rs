//! Asynchronous, best-effort cache admission.
//!
//! Renders are admitted through a bounded queue consumed by one background
//! worker, so the request path never blocks on the store lock and a full
//! queue degrades to "not cached" rather than back-pressure. `close()`
//! drains the queue deterministically; the shutdown sequence awaits it.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use metrics::counter;
use tokio::sync::mpsc::{self, Sender, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::store::FragmentStore;

const SOURCE: &str = "cache::writer";

struct Admission {
    key: String,
    payload: Bytes,
    cost: u64,
    ttl: Duration,
    status: u16,
}

/// The fragment cache facade: synchronous reads, queued writes.
pub struct FragmentCache {
    store: Arc<FragmentStore>,
    tx: std::sync::Mutex<Option<Sender<Admission>>>,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl FragmentCache {
    /// Spawn the admission worker. `max_cost` bounds the store's byte
    /// budget; `queue_capacity` bounds pending admissions.
    pub fn new(max_cost: u64, queue_capacity: usize) -> Self {
        let store = Arc::new(FragmentStore::new(max_cost));
        let (tx, mut rx) = mpsc::channel::<Admission>(queue_capacity.max(1));

        let worker_store = store.clone();
        let worker = tokio::spawn(async move {
            while let Some(admission) = rx.recv().await {
                if !(200..300).contains(&admission.status) {
                    continue;
                }
                worker_store.set_with_ttl(
                    admission.key,
                    admission.payload,
                    admission.cost,
                    admission.ttl,
                );
            }
            debug!(target = "brezza::cache", "fragment cache admission queue drained");
        });

        Self {
            store,
            tx: std::sync::Mutex::new(Some(tx)),
            worker: tokio::sync::Mutex::new(Some(worker)),
        }
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.store.get(key)
    }

    /// Queue one render for admission. Only 2xx responses are admitted; a
    /// full or closed queue drops the admission and the render is simply
    /// not cached.
    pub fn set_with_ttl(&self, key: String, payload: Bytes, cost: u64, ttl: Duration, status: u16) {
        let guard = match self.tx.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(tx) = guard.as_ref() else {
            return;
        };

        let admission = Admission {
            key,
            payload,
            cost,
            ttl,
            status,
        };
        match tx.try_send(admission) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => {
                counter!("brezza_fragment_cache_admission_dropped_total").increment(1);
                warn!(
                    target = "brezza::cache",
                    source = SOURCE,
                    key = %dropped.key,
                    "admission queue full, render not cached"
                );
            }
            Err(TrySendError::Closed(_)) => {
                counter!("brezza_fragment_cache_admission_dropped_total").increment(1);
            }
        }
    }

    /// Stop accepting admissions and wait for the worker to drain the
    /// queue. Safe to call once; later calls are no-ops.
    pub async fn close(&self) {
        let tx = {
            let mut guard = match self.tx.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.take()
        };
        drop(tx);

        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                warn!(
                    target = "brezza::cache",
                    source = SOURCE,
                    error = %err,
                    "fragment cache worker ended abnormally"
                );
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &FragmentStore {
        &self.store
    }
}
