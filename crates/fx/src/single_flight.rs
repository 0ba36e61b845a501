//! Collapses concurrent work for the same key into one execution.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;

type Calls<K, V> = Mutex<HashMap<K, Arc<OnceCell<V>>>>;

pub struct SingleFlight<K, V> {
    calls: Calls<K, V>,
}

impl<K, V> Default for SingleFlight<K, V> {
    fn default() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `work` unless a call for `key` is already in flight, in which case
    /// this waits for that call and returns a clone of its value.
    ///
    /// The key is forgotten once the call finishes, or once every caller
    /// waiting on it has been cancelled, so a later call starts fresh. If the
    /// caller running `work` is cancelled, a remaining waiter takes over and
    /// new callers keep joining it.
    pub async fn run<F, Fut>(&self, key: K, work: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let cell = {
            let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(
                calls
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(OnceCell::new())),
            )
        };
        let guard = Cleanup {
            calls: &self.calls,
            key,
            cell,
        };
        guard.cell.get_or_init(work).await.clone()
    }

    /// Keys with a call currently in flight.
    pub fn in_flight(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

struct Cleanup<'a, K: Eq + Hash, V> {
    calls: &'a Calls<K, V>,
    key: K,
    cell: Arc<OnceCell<V>>,
}

impl<K: Eq + Hash, V> Drop for Cleanup<'_, K, V> {
    fn drop(&mut self) {
        let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        // A newer call may already own the slot.
        let owns_slot = calls
            .get(&self.key)
            .is_some_and(|current| Arc::ptr_eq(current, &self.cell));
        // The map and this guard hold one reference each; any more are other waiters.
        let last_waiter = Arc::strong_count(&self.cell) <= 2;
        if owns_slot && (self.cell.initialized() || last_waiter) {
            calls.remove(&self.key);
        }
    }
}
