//! In-flight `wait_task` calls, keyed by task id.
//!
//! Every waiter holds a [`WaitRegistration`]. Waiters on the same task share
//! one entry and one token; the entry goes away when the last registration
//! is dropped, which also covers a client that disconnects mid-wait.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

struct PendingWait {
    token: CancellationToken,
    waiters: usize,
    /// Distinguishes this entry from a later one for the same task, so a
    /// registration outliving a cancel never touches its successor.
    generation: u64,
}

pub struct WaitRegistry {
    entries: DashMap<String, PendingWait>,
    next_generation: AtomicU64,
    shutdown: CancellationToken,
}

impl WaitRegistry {
    /// Tokens handed out are children of `shutdown`.
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            entries: DashMap::new(),
            next_generation: AtomicU64::new(0),
            shutdown,
        }
    }

    pub fn register(self: &Arc<Self>, task_id: &str) -> WaitRegistration {
        let mut entry = self
            .entries
            .entry(task_id.to_string())
            .or_insert_with(|| PendingWait {
                token: self.shutdown.child_token(),
                waiters: 0,
                generation: self.next_generation.fetch_add(1, Ordering::Relaxed),
            });
        entry.waiters += 1;
        debug!(task_id = %task_id, waiters = entry.waiters, "Wait registered");

        WaitRegistration {
            registry: Arc::clone(self),
            task_id: task_id.to_string(),
            generation: entry.generation,
            token: entry.token.clone(),
        }
    }

    /// Cancel every wait on `task_id`. False when nothing is waiting.
    pub fn cancel(&self, task_id: &str) -> bool {
        match self.entries.remove(task_id) {
            Some((_, pending)) => {
                pending.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, task_id: &str) -> bool {
        self.entries.contains_key(task_id)
    }

    /// Number of tasks with at least one waiter.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn release(&self, task_id: &str, generation: u64) {
        if let Entry::Occupied(mut entry) = self.entries.entry(task_id.to_string()) {
            if entry.get().generation != generation {
                return;
            }
            entry.get_mut().waiters -= 1;
            if entry.get().waiters == 0 {
                entry.remove();
            }
        }
    }
}

/// One waiter's claim on a registry entry; released on drop.
pub struct WaitRegistration {
    registry: Arc<WaitRegistry>,
    task_id: String,
    generation: u64,
    token: CancellationToken,
}

impl WaitRegistration {
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for WaitRegistration {
    fn drop(&mut self) {
        self.registry.release(&self.task_id, self.generation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Arc<WaitRegistry> {
        Arc::new(WaitRegistry::new(CancellationToken::new()))
    }

    #[test]
    fn test_entry_lives_until_last_waiter_leaves() {
        let waits = registry();
        let first = waits.register("t-1");
        let second = waits.register("t-1");
        assert_eq!(waits.len(), 1);

        drop(first);
        assert!(waits.is_pending("t-1"));

        drop(second);
        assert!(!waits.is_pending("t-1"));
        assert!(waits.is_empty());
    }

    #[test]
    fn test_cancel_reaches_every_waiter() {
        let waits = registry();
        let first = waits.register("t-1");
        let second = waits.register("t-1");

        assert!(waits.cancel("t-1"));
        assert!(first.token().is_cancelled());
        assert!(second.token().is_cancelled());
        assert!(!waits.cancel("t-1"));
    }

    #[test]
    fn test_stale_registration_leaves_successor_alone() {
        let waits = registry();
        let old = waits.register("t-1");
        waits.cancel("t-1");

        let fresh = waits.register("t-1");
        assert!(!fresh.token().is_cancelled());

        drop(old);
        assert!(waits.is_pending("t-1"));
        drop(fresh);
        assert!(!waits.is_pending("t-1"));
    }

    #[test]
    fn test_shutdown_cancels_registered_waits() {
        let shutdown = CancellationToken::new();
        let waits = Arc::new(WaitRegistry::new(shutdown.clone()));
        let registration = waits.register("t-1");
        shutdown.cancel();
        assert!(registration.token().is_cancelled());
    }
}
