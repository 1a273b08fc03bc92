//! Collapses concurrent misses on one key into a single upstream fetch.

use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// In-flight fetches keyed by cache key.
///
/// The first caller for a key starts the future; everyone arriving while
/// it is pending awaits a clone of the same `Shared` handle.
pub struct SingleFlight<T: Clone + Send + Sync + 'static> {
    pending: Mutex<HashMap<String, Shared<BoxFuture<'static, T>>>>,
}

impl<T: Clone + Send + Sync + 'static> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> SingleFlight<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `make()` for `key` unless a fetch is already pending.
    ///
    /// Returns the value and whether this caller joined an existing
    /// fetch instead of starting one.
    pub async fn run<F>(&self, key: &str, make: F) -> (T, bool)
    where
        F: FnOnce() -> BoxFuture<'static, T>,
    {
        let (fut, joined) = {
            let mut pending = self.pending.lock().await;
            match pending.get(key) {
                Some(existing) => (existing.clone(), true),
                None => {
                    let fut = make().shared();
                    pending.insert(key.to_string(), fut.clone());
                    (fut, false)
                }
            }
        };

        let value = fut.clone().await;

        let mut pending = self.pending.lock().await;
        if pending.get(key).is_some_and(|current| current.ptr_eq(&fut)) {
            pending.remove(key);
        }
        (value, joined)
    }

    /// Number of keys with a fetch currently pending.
    pub async fn in_flight(&self) -> usize {
        self.pending.lock().await.len()
    }
}
