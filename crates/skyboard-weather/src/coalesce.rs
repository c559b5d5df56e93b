//! Request coalescing for same-city fetches.
//!
//! When a fetch for a key is already in flight, later callers subscribe to
//! the leader's result instead of issuing duplicate provider calls.
//!
//! ```text
//! user add ──────┐
//!                ├──► RequestCoalescer ──► one gateway round-trip
//! scheduler tick ┘          │
//!                           ▼
//!                 every caller gets the same result
//! ```

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::debug;

/// Statistics for monitoring coalescing effectiveness.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CoalescerStats {
    pub total_requests: u64,
    /// Requests that waited on an existing fetch
    pub coalesced_requests: u64,
    /// Requests that started a new fetch
    pub new_requests: u64,
}

/// Outcome of registering interest in a key.
pub enum Registration<'a, T: Clone> {
    /// No fetch was running: the caller must do the work and complete it.
    Leader(LeaderGuard<'a, T>),
    /// A fetch is already running: wait on the receiver.
    Follower(broadcast::Receiver<T>),
}

/// Tracks in-flight requests by key.
pub struct RequestCoalescer<T: Clone> {
    in_flight: Mutex<HashMap<String, broadcast::Sender<T>>>,
    total_requests: AtomicU64,
    coalesced_requests: AtomicU64,
    new_requests: AtomicU64,
}

impl<T: Clone> Default for RequestCoalescer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> std::fmt::Debug for RequestCoalescer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestCoalescer")
            .field("in_flight", &self.in_flight_count())
            .field("stats", &self.stats())
            .finish()
    }
}

impl<T: Clone> RequestCoalescer<T> {
    pub fn new() -> Self {
        Self {
            in_flight: Mutex::new(HashMap::new()),
            total_requests: AtomicU64::new(0),
            coalesced_requests: AtomicU64::new(0),
            new_requests: AtomicU64::new(0),
        }
    }

    /// Register a request for `key`.
    ///
    /// `before_lead` runs under the registry lock just before this caller
    /// would become the leader; returning `Some` short-circuits with that
    /// value. The orchestrator uses it to re-check the cache so a request
    /// arriving right after a leader finished does not fetch again.
    pub fn register<F>(&self, key: &str, before_lead: F) -> Result<Registration<'_, T>, T>
    where
        F: FnOnce() -> Option<T>,
    {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        let mut in_flight = self.in_flight.lock();

        if let Some(tx) = in_flight.get(key) {
            self.coalesced_requests.fetch_add(1, Ordering::Relaxed);
            debug!(key, "Coalescing request, waiting for in-flight fetch");
            return Ok(Registration::Follower(tx.subscribe()));
        }

        if let Some(ready) = before_lead() {
            return Err(ready);
        }

        // Typical fan-in is the user plus the scheduler
        let (tx, _rx) = broadcast::channel(4);
        in_flight.insert(key.to_string(), tx.clone());
        self.new_requests.fetch_add(1, Ordering::Relaxed);
        debug!(key, in_flight = in_flight.len(), "New request, starting fetch");

        Ok(Registration::Leader(LeaderGuard {
            coalescer: self,
            key: key.to_string(),
            sender: Some(tx),
        }))
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    pub fn stats(&self) -> CoalescerStats {
        CoalescerStats {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            coalesced_requests: self.coalesced_requests.load(Ordering::Relaxed),
            new_requests: self.new_requests.load(Ordering::Relaxed),
        }
    }

    fn remove(&self, key: &str) -> Option<broadcast::Sender<T>> {
        self.in_flight.lock().remove(key)
    }
}

/// Held by the caller doing the real work.
///
/// Dropping it without calling [`LeaderGuard::complete`] unregisters the
/// key and closes the channel, so followers see a receive error instead of
/// waiting forever.
pub struct LeaderGuard<'a, T: Clone> {
    coalescer: &'a RequestCoalescer<T>,
    key: String,
    sender: Option<broadcast::Sender<T>>,
}

impl<T: Clone> LeaderGuard<'_, T> {
    /// Unregister the key and broadcast `result` to every follower.
    pub fn complete(mut self, result: T) {
        self.coalescer.remove(&self.key);
        if let Some(tx) = self.sender.take() {
            let waiters = tx.receiver_count();
            // Err only means nobody is listening
            let _ = tx.send(result);
            if waiters > 0 {
                debug!(key = %self.key, waiters, "Broadcast result to coalesced waiters");
            }
        }
    }
}

impl<T: Clone> Drop for LeaderGuard<'_, T> {
    fn drop(&mut self) {
        if self.sender.take().is_some() {
            self.coalescer.remove(&self.key);
            debug!(key = %self.key, "In-flight fetch abandoned, waiters will receive error");
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;

    fn leader<'a>(c: &'a RequestCoalescer<u32>, key: &str) -> LeaderGuard<'a, u32> {
        match c.register(key, || None) {
            Ok(Registration::Leader(guard)) => guard,
            _ => panic!("expected leader"),
        }
    }

    fn follower(c: &RequestCoalescer<u32>, key: &str) -> broadcast::Receiver<u32> {
        match c.register(key, || None) {
            Ok(Registration::Follower(rx)) => rx,
            _ => panic!("expected follower"),
        }
    }

    #[tokio::test]
    async fn test_followers_receive_leader_result() {
        let coalescer = RequestCoalescer::new();
        let guard = leader(&coalescer, "weather_Paris_metric");
        let mut a = follower(&coalescer, "weather_Paris_metric");
        let mut b = follower(&coalescer, "weather_Paris_metric");

        guard.complete(42);

        assert_eq!(a.recv().await.unwrap(), 42);
        assert_eq!(b.recv().await.unwrap(), 42);
        assert_eq!(coalescer.in_flight_count(), 0);

        let stats = coalescer.stats();
        assert_eq!(stats.total_requests, 3);
        assert_eq!(stats.coalesced_requests, 2);
        assert_eq!(stats.new_requests, 1);
    }

    #[test]
    fn test_distinct_keys_do_not_coalesce() {
        let coalescer = RequestCoalescer::<u32>::new();
        let _paris = leader(&coalescer, "weather_Paris_metric");
        let _paris_f = leader(&coalescer, "weather_Paris_imperial");
        assert_eq!(coalescer.in_flight_count(), 2);
    }

    #[tokio::test]
    async fn test_dropped_leader_closes_channel() {
        let coalescer = RequestCoalescer::new();
        let guard = leader(&coalescer, "k");
        let mut rx = follower(&coalescer, "k");

        drop(guard);

        assert!(rx.recv().await.is_err());
        assert_eq!(coalescer.in_flight_count(), 0);
        // The key is free again
        let _next = leader(&coalescer, "k");
    }

    #[test]
    fn test_before_lead_short_circuits() {
        let coalescer = RequestCoalescer::<u32>::new();
        match coalescer.register("k", || Some(7)) {
            Err(ready) => assert_eq!(ready, 7),
            Ok(_) => panic!("expected short-circuit"),
        }
        assert_eq!(coalescer.in_flight_count(), 0);
    }
}
