//! Request coalescing.
//!
//! Concurrent calls for the same key share one execution: the first caller
//! leads and runs the work, later callers subscribe to its result. A flight is
//! forgotten as soon as it completes, so a call after completion runs again.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tracing::debug;

/// Deduplicates concurrent work per key.
pub struct Group<T> {
    flights: Mutex<HashMap<String, broadcast::Sender<T>>>,
}

impl<T: Clone + Send + 'static> Group<T> {
    pub fn new() -> Self {
        Self {
            flights: Mutex::new(HashMap::new()),
        }
    }

    /// Runs `f` for `key`, or waits for the call already in flight.
    ///
    /// Every caller in the same flight receives a clone of the leader's
    /// result. If the leader is cancelled before finishing, one of the
    /// waiters takes over and runs its own `f`.
    pub async fn call<F, Fut>(&self, key: &str, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        loop {
            let mut receiver = {
                let mut flights = self.flights();
                match flights.get(key) {
                    Some(sender) => sender.subscribe(),
                    None => {
                        let (sender, _) = broadcast::channel(1);
                        flights.insert(key.to_string(), sender);
                        break;
                    }
                }
            };

            debug!(key = %key, "Joining in-flight call");
            match receiver.recv().await {
                Ok(value) => return value,
                // leader dropped without a result
                Err(_) => continue,
            }
        }

        let flight = Flight {
            group: self,
            key,
            landed: false,
        };
        let value = f().await;
        flight.land(value.clone());
        value
    }

    /// Number of keys with a call in flight.
    pub fn in_flight(&self) -> usize {
        self.flights().len()
    }

    fn flights(&self) -> MutexGuard<'_, HashMap<String, broadcast::Sender<T>>> {
        self.flights.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone + Send + 'static> Default for Group<T> {
    fn default() -> Self {
        Self::new()
    }
}

// == Flight ==
/// Leader-side registration; clears the key even if the leader is cancelled.
struct Flight<'a, T: Clone + Send + 'static> {
    group: &'a Group<T>,
    key: &'a str,
    landed: bool,
}

impl<T: Clone + Send + 'static> Flight<'_, T> {
    fn land(mut self, value: T) {
        self.landed = true;
        let sender = self.group.flights().remove(self.key);
        if let Some(sender) = sender {
            // no receivers is fine
            let _ = sender.send(value);
        }
    }
}

impl<T: Clone + Send + 'static> Drop for Flight<'_, T> {
    fn drop(&mut self) {
        if !self.landed {
            self.group.flights().remove(self.key);
        }
    }
}
