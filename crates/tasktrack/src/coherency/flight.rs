//! Per-key collapsing of concurrent loads.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};

/// Runs at most one load per key at a time.
///
/// The first caller for a key starts the load; callers that arrive while it
/// is in flight wait for the same result instead of issuing their own. The
/// flight is removed once it completes, so the next miss loads again.
pub struct SingleFlight<T> {
    flights: Mutex<HashMap<String, Arc<OnceCell<T>>>>,
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            flights: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone> SingleFlight<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Joins the in-flight load for `key`, or starts one with `load`.
    pub async fn run<F, Fut>(&self, key: &str, load: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let cell = {
            let mut flights = self.flights.lock().await;
            flights
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let value = cell.get_or_init(load).await.clone();

        let mut flights = self.flights.lock().await;
        if flights
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, &cell))
        {
            flights.remove(key);
        }

        value
    }

    /// Detaches the in-flight load for `key` so later callers start fresh.
    ///
    /// Callers already waiting on the detached load still receive its result.
    pub async fn forget(&self, key: &str) {
        self.flights.lock().await.remove(key);
    }

    /// Detaches every in-flight load whose key starts with `prefix`.
    pub async fn forget_prefix(&self, prefix: &str) {
        self.flights
            .lock()
            .await
            .retain(|key, _| !key.starts_with(prefix));
    }

    /// Number of loads currently in flight.
    pub async fn in_flight(&self) -> usize {
        self.flights.lock().await.len()
    }
}
