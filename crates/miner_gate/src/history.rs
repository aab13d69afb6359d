use dashmap::DashMap;
use std::collections::VecDeque;

use crate::request::Identity;

/// Per-caller ring of the most recent request arrival times.
///
/// A caller's history is created holding `capacity` zero timestamps and stays
/// exactly that long, so fixed-offset lookbacks never run off the front.
/// Entries are locked per caller; unrelated callers never contend.
pub struct TimestampTracker {
    capacity: usize,
    history: DashMap<Identity, VecDeque<f64>>,
}

impl TimestampTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            history: DashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append `timestamp` for `id`, dropping the oldest entry.
    pub fn record(&self, id: &Identity, timestamp: f64) {
        let mut entry = self
            .history
            .entry(id.clone())
            .or_insert_with(|| VecDeque::from(vec![0.0; self.capacity]));
        entry.push_back(timestamp);
        while entry.len() > self.capacity {
            entry.pop_front();
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.history.contains_key(id)
    }

    /// Timestamp at position `index`, oldest first.
    pub fn get(&self, id: &str, index: usize) -> Option<f64> {
        self.history.get(id).and_then(|h| h.get(index).copied())
    }

    pub fn oldest(&self, id: &str) -> Option<f64> {
        self.get(id, 0)
    }

    pub fn history(&self, id: &str) -> Option<Vec<f64>> {
        self.history.get(id).map(|h| h.iter().copied().collect())
    }

    /// Number of callers with a recorded history.
    pub fn callers(&self) -> usize {
        self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn new_history_is_padded_with_sentinels() {
        let t = TimestampTracker::new(4);
        let id = Identity::from("alice");
        assert!(!t.contains("alice"));
        t.record(&id, 10.0);
        assert_eq!(t.history("alice").unwrap(), vec![0.0, 0.0, 0.0, 10.0]);
        assert_eq!(t.oldest("alice"), Some(0.0));
    }

    #[test]
    fn record_drops_oldest_beyond_capacity() {
        let t = TimestampTracker::new(3);
        let id = Identity::from("alice");
        for ts in [1.0, 2.0, 3.0, 4.0, 5.0] {
            t.record(&id, ts);
        }
        assert_eq!(t.history("alice").unwrap(), vec![3.0, 4.0, 5.0]);
        assert_eq!(t.get("alice", 2), Some(5.0));
        assert_eq!(t.get("alice", 3), None);
    }

    #[test]
    fn callers_are_tracked_independently() {
        let t = TimestampTracker::new(2);
        t.record(&Identity::from("a"), 1.0);
        t.record(&Identity::from("b"), 2.0);
        assert_eq!(t.callers(), 2);
        assert_eq!(t.history("a").unwrap(), vec![0.0, 1.0]);
        assert_eq!(t.history("b").unwrap(), vec![0.0, 2.0]);
    }

    #[test]
    fn concurrent_records_keep_length_fixed() {
        let t = Arc::new(TimestampTracker::new(16));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let t = Arc::clone(&t);
                thread::spawn(move || {
                    let id = Identity::from("hot");
                    for n in 0..100 {
                        t.record(&id, (i * 1000 + n) as f64);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let hist = t.history("hot").unwrap();
        assert_eq!(hist.len(), 16);
        assert!(hist.iter().all(|ts| *ts > 0.0));
    }
}
