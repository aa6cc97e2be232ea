//! Fire-and-forget view recording.
//!
//! Page views are observed on the request path but written to the ledger by
//! a background worker, so a request never pays for an argon2 derivation.
//! Overflow drops the view; a lost view is an accepted cost.

use std::sync::Arc;

use metrics::counter;
use tokio::sync::mpsc::{self, Sender, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::InteractionLedger;

const SOURCE: &str = "ledger::recorder";

struct ViewEvent {
    raw_id: String,
    page: String,
}

pub struct ViewRecorder {
    tx: std::sync::Mutex<Option<Sender<ViewEvent>>>,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ViewRecorder {
    pub fn new(ledger: Arc<InteractionLedger>, queue_capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<ViewEvent>(queue_capacity.max(1));

        let worker = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let ledger = ledger.clone();
                // Handle derivation is CPU-bound on a cold memo.
                let outcome = tokio::task::spawn_blocking(move || {
                    ledger.view(&event.raw_id, &event.page);
                })
                .await;
                if let Err(err) = outcome {
                    warn!(
                        target = "brezza::ledger",
                        source = SOURCE,
                        error = %err,
                        "view write task ended abnormally"
                    );
                }
            }
            debug!(target = "brezza::ledger", "view queue drained");
        });

        Self {
            tx: std::sync::Mutex::new(Some(tx)),
            worker: tokio::sync::Mutex::new(Some(worker)),
        }
    }

    /// Queue one view. A full or closed queue drops it.
    pub fn record(&self, raw_id: String, page: String) {
        let guard = match self.tx.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(tx) = guard.as_ref() else {
            return;
        };

        match tx.try_send(ViewEvent { raw_id, page }) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => {
                counter!("brezza_view_dropped_total").increment(1);
                warn!(
                    target = "brezza::ledger",
                    source = SOURCE,
                    page = %dropped.page,
                    "view queue full, view dropped"
                );
            }
            Err(TrySendError::Closed(_)) => {
                counter!("brezza_view_dropped_total").increment(1);
            }
        }
    }

    /// Stop accepting views and wait for queued ones to reach the ledger.
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
                    target = "brezza::ledger",
                    source = SOURCE,
                    error = %err,
                    "view recorder worker ended abnormally"
                );
            }
        }
    }
}
