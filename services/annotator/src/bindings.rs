//! Bounded window of recent pod→node bindings.
//!
//! Written by the event controller, read by metric-sync workers when
//! they compute hot values. The ring is capacity-bounded (oldest record
//! evicted regardless of age) and a periodic GC additionally drops
//! records older than the longest configured hot-value window.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
struct Binding {
    node: String,
    timestamp: DateTime<Utc>,
}

pub struct BindingRecords {
    records: Mutex<VecDeque<Binding>>,
    capacity: usize,
    /// GC horizon: the longest hot-value time range in the policy.
    max_window: Duration,
}

impl BindingRecords {
    pub fn new(capacity: usize, max_window: Duration) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
            capacity: capacity.max(1),
            max_window,
        }
    }

    /// Record one binding; evicts the oldest record once full.
    pub fn insert(&self, node: &str, timestamp: DateTime<Utc>) {
        let mut records = self.records.lock().expect("binding lock poisoned");
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(Binding {
            node: node.to_string(),
            timestamp,
        });
    }

    /// Bindings on `node` within the trailing `window`.
    pub fn count_since(&self, node: &str, window: Duration, now: DateTime<Utc>) -> usize {
        let cutoff = now - chrono::Duration::from_std(window).unwrap_or(chrono::Duration::zero());
        let records = self.records.lock().expect("binding lock poisoned");
        records
            .iter()
            .filter(|b| b.node == node && b.timestamp >= cutoff)
            .count()
    }

    /// Evict records older than the GC horizon.
    pub fn gc(&self, now: DateTime<Utc>) {
        let cutoff =
            now - chrono::Duration::from_std(self.max_window).unwrap_or(chrono::Duration::zero());
        let mut records = self.records.lock().expect("binding lock poisoned");
        let before = records.len();
        while records
            .front()
            .is_some_and(|b| b.timestamp < cutoff)
        {
            records.pop_front();
        }
        let evicted = before - records.len();
        if evicted > 0 {
            debug!(evicted, remaining = records.len(), "binding gc pass");
        }
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("binding lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One-minute GC ticker; runs until shutdown.
    pub async fn run_gc(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => self.gc(Utc::now()),
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("binding gc shutting down");
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seconds(n: i64) -> chrono::Duration {
        chrono::Duration::seconds(n)
    }

    #[test]
    fn count_within_window() {
        let records = BindingRecords::new(16, Duration::from_secs(300));
        let now = Utc::now();
        records.insert("n1", now - seconds(30));
        records.insert("n1", now - seconds(90));
        records.insert("n2", now - seconds(10));

        assert_eq!(records.count_since("n1", Duration::from_secs(60), now), 1);
        assert_eq!(records.count_since("n1", Duration::from_secs(120), now), 2);
        assert_eq!(records.count_since("n2", Duration::from_secs(60), now), 1);
        assert_eq!(records.count_since("n3", Duration::from_secs(60), now), 0);
    }

    #[test]
    fn capacity_evicts_oldest() {
        let records = BindingRecords::new(3, Duration::from_secs(3600));
        let now = Utc::now();
        for i in 0..5 {
            records.insert("n1", now - seconds(10 - i));
        }
        assert_eq!(records.len(), 3);
        // The two oldest inserts fell off.
        assert_eq!(records.count_since("n1", Duration::from_secs(3600), now), 3);
    }

    #[test]
    fn hot_count_monotone_under_insert() {
        let records = BindingRecords::new(16, Duration::from_secs(300));
        let now = Utc::now();
        let window = Duration::from_secs(60);

        let before = records.count_since("n1", window, now);
        records.insert("n1", now);
        let after = records.count_since("n1", window, now);
        assert!(after >= before);
        assert_eq!(after, before + 1);
    }

    #[test]
    fn gc_prunes_only_expired() {
        let records = BindingRecords::new(16, Duration::from_secs(120));
        let now = Utc::now();
        records.insert("n1", now - seconds(300));
        records.insert("n1", now - seconds(60));
        records.insert("n1", now - seconds(10));

        let counted_before = records.count_since("n1", Duration::from_secs(120), now);
        records.gc(now);
        let counted_after = records.count_since("n1", Duration::from_secs(120), now);

        // GC never increases the visible count.
        assert!(counted_after <= counted_before);
        assert_eq!(records.len(), 2);
        assert_eq!(counted_after, 2);
    }
}
