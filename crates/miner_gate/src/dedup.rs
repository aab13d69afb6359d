use parking_lot::Mutex;
use std::collections::HashMap;

use crate::request::Fingerprint;

/// Block-height bounded cache of recently seen payload fingerprints.
pub struct DedupCache {
    seen: Mutex<HashMap<Fingerprint, u64>>,
    ttl_blocks: u64,
}

impl DedupCache {
    pub fn new(ttl_blocks: u64) -> Self {
        Self {
            seen: Mutex::new(HashMap::new()),
            ttl_blocks,
        }
    }

    pub fn ttl_blocks(&self) -> u64 {
        self.ttl_blocks
    }

    /// Returns true if `fp` was already recorded within the TTL window.
    ///
    /// Expired entries are swept before the lookup, so a fingerprint whose
    /// window has closed counts as new even if no other call purged it yet.
    /// Sweep, lookup and insert run under a single lock acquisition.
    pub fn check_and_record(&self, fp: &Fingerprint, current_block: u64) -> bool {
        let mut guard = self.seen.lock();
        let before = guard.len();
        let ttl = self.ttl_blocks;
        guard.retain(|_, first_seen| first_seen.saturating_add(ttl) >= current_block);
        let removed = before - guard.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = guard.len(), "dedup cache swept");
        }
        let duplicate = guard.contains_key(fp);
        if !duplicate {
            guard.insert(*fp, current_block);
        }
        #[cfg(feature = "telemetry")]
        {
            crate::telemetry::DEDUP_ENTRIES.set(guard.len() as i64);
            if duplicate {
                crate::telemetry::DUPLICATE_TOTAL.inc();
            }
        }
        duplicate
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }
}
