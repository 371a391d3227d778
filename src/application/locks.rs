//! # Resource Locks
//!
//! Keyed lock table used by each integration to serialize calls that touch the
//! same remote resource (one ticket, one page). Calls on different keys never
//! contend. Entries are dropped as soon as nobody holds or waits for them,
//! including when a waiter is cancelled before it gets the lock.

use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, ready};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Table = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

#[derive(Debug, Default, Clone)]
pub struct ResourceLocks {
    table: Table,
}

impl ResourceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `key`. Waiters are served in arrival order.
    pub fn acquire(&self, key: &str) -> Acquire {
        let lock = {
            let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
            table
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        Acquire {
            key: key.to_string(),
            table: self.table.clone(),
            pending: Some(lock.lock_owned().boxed()),
        }
    }

    /// Number of keys currently held or awaited.
    pub fn active_keys(&self) -> usize {
        self.table.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Removes `key` once the table holds the only reference to its lock.
fn prune(table: &Table, key: &str) {
    let mut table = table.lock().unwrap_or_else(|e| e.into_inner());
    if table
        .get(key)
        .is_some_and(|lock| Arc::strong_count(lock) == 1)
    {
        table.remove(key);
    }
}

/// Future returned by [`ResourceLocks::acquire`]. Dropping it before it
/// resolves gives up the place in the queue and prunes the entry.
pub struct Acquire {
    key: String,
    table: Table,
    pending: Option<BoxFuture<'static, OwnedMutexGuard<()>>>,
}

impl Future for Acquire {
    type Output = ResourceGuard;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<ResourceGuard> {
        let Some(pending) = self.pending.as_mut() else {
            panic!("Acquire polled after completion");
        };
        let guard = ready!(pending.poll_unpin(cx));
        self.pending = None;
        Poll::Ready(ResourceGuard {
            key: self.key.clone(),
            guard: Some(guard),
            table: self.table.clone(),
        })
    }
}

impl Drop for Acquire {
    fn drop(&mut self) {
        // Still waiting: release our reference to the lock first.
        if self.pending.take().is_some() {
            prune(&self.table, &self.key);
        }
    }
}

/// Held for the duration of one invocation; released on drop, including
/// when the owning future is cancelled or unwinds.
#[derive(Debug)]
pub struct ResourceGuard {
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
    table: Table,
}

impl ResourceGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        prune(&self.table, &self.key);
    }
}
