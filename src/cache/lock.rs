//! Poison-recovering `RwLock` helpers. A panic while a guard is held leaves
//! byte-cache or memo state that is safe to keep serving, so recovery beats
//! propagating the poison.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

pub(crate) fn rw_read<'a, T>(
    lock: &'a RwLock<T>,
    source: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(
                target = "brezza::lock",
                source,
                op,
                lock = "rwlock.read",
                "recovered a poisoned lock, state may be stale"
            );
            poisoned.into_inner()
        }
    }
}

pub(crate) fn rw_write<'a, T>(
    lock: &'a RwLock<T>,
    source: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(
                target = "brezza::lock",
                source,
                op,
                lock = "rwlock.write",
                "recovered a poisoned lock, state may be stale"
            );
            poisoned.into_inner()
        }
    }
}
