//! View of the network state consumed by admission and priority scoring.
//!
//! A [`NetworkSnapshot`] is immutable once built. The sync loop swaps whole
//! snapshots into a [`SnapshotHandle`]; readers clone the inner `Arc` and keep
//! evaluating against it even if a newer snapshot lands mid-request.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::config::SnapshotConfig;
use crate::error::SnapshotError;
use crate::request::Identity;

/// Registered identities with their stake and validator permits at `block`.
/// The UID of an identity is its index in `identities`.
#[derive(Clone, Debug, PartialEq)]
pub struct NetworkSnapshot {
    block: u64,
    identities: Vec<Identity>,
    stake: Vec<f64>,
    validator_permit: Vec<bool>,
    uids: HashMap<Identity, usize>,
}

impl NetworkSnapshot {
    pub fn new(
        block: u64,
        identities: Vec<Identity>,
        stake: Vec<f64>,
        validator_permit: Vec<bool>,
    ) -> Result<Self, SnapshotError> {
        if identities.len() != stake.len() || identities.len() != validator_permit.len() {
            return Err(SnapshotError::LengthMismatch {
                identities: identities.len(),
                stake: stake.len(),
                permits: validator_permit.len(),
            });
        }
        if let Some((uid, s)) = stake
            .iter()
            .enumerate()
            .find(|(_, s)| !(s.is_finite() && **s >= 0.0))
        {
            return Err(SnapshotError::InvalidStake { uid, stake: *s });
        }
        let mut uids = HashMap::with_capacity(identities.len());
        for (uid, id) in identities.iter().enumerate() {
            // first occurrence owns the uid
            uids.entry(id.clone()).or_insert(uid);
        }
        Ok(Self {
            block,
            identities,
            stake,
            validator_permit,
            uids,
        })
    }

    pub fn block(&self) -> u64 {
        self.block
    }

    pub fn identities(&self) -> &[Identity] {
        &self.identities
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn uid_of(&self, id: &str) -> Option<usize> {
        self.uids.get(id).copied()
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.uids.contains_key(id)
    }

    pub fn stake(&self, uid: usize) -> Option<f64> {
        self.stake.get(uid).copied()
    }

    pub fn has_validator_permit(&self, uid: usize) -> bool {
        self.validator_permit.get(uid).copied().unwrap_or(false)
    }
}

/// Supplier of the most recent snapshot, `None` until the first sync.
pub trait SnapshotSource: Send + Sync {
    fn current(&self) -> Option<Arc<NetworkSnapshot>>;
}

/// Atomically swappable slot holding the latest snapshot.
#[derive(Default)]
pub struct SnapshotHandle {
    inner: RwLock<Option<Arc<NetworkSnapshot>>>,
}

impl SnapshotHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: NetworkSnapshot) -> Self {
        Self {
            inner: RwLock::new(Some(Arc::new(snapshot))),
        }
    }

    /// Install `snapshot` unconditionally, returning the previous one.
    pub fn replace(&self, snapshot: NetworkSnapshot) -> Option<Arc<NetworkSnapshot>> {
        self.inner.write().replace(Arc::new(snapshot))
    }

    /// Install `snapshot` unless the held one is at a later block.
    pub fn advance(&self, snapshot: NetworkSnapshot) -> bool {
        let mut guard = self.inner.write();
        if let Some(cur) = guard.as_ref() {
            if cur.block() > snapshot.block() {
                return false;
            }
        }
        *guard = Some(Arc::new(snapshot));
        true
    }

    pub fn clear(&self) {
        *self.inner.write() = None;
    }
}

impl SnapshotSource for SnapshotHandle {
    fn current(&self) -> Option<Arc<NetworkSnapshot>> {
        self.inner.read().clone()
    }
}

impl<T: SnapshotSource + ?Sized> SnapshotSource for Arc<T> {
    fn current(&self) -> Option<Arc<NetworkSnapshot>> {
        (**self).current()
    }
}

/// Background resync of a [`SnapshotHandle`] from the chain.
pub struct SnapshotRefresher;

const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

impl SnapshotRefresher {
    /// [`SnapshotRefresher::spawn`] at `snapshot.refresh_interval_secs`.
    pub fn spawn_with_config<F, E>(
        handle: Arc<SnapshotHandle>,
        fetch: F,
        cfg: &SnapshotConfig,
        shutdown: Arc<AtomicBool>,
    ) -> thread::JoinHandle<()>
    where
        F: FnMut() -> Result<NetworkSnapshot, E> + Send + 'static,
        E: Display,
    {
        Self::spawn(handle, fetch, cfg.interval(), shutdown)
    }

    /// Spawn a thread calling `fetch` every `interval` until `shutdown` is set.
    /// Failed fetches and stale snapshots leave the held snapshot untouched.
    pub fn spawn<F, E>(
        handle: Arc<SnapshotHandle>,
        mut fetch: F,
        interval: Duration,
        shutdown: Arc<AtomicBool>,
    ) -> thread::JoinHandle<()>
    where
        F: FnMut() -> Result<NetworkSnapshot, E> + Send + 'static,
        E: Display,
    {
        thread::spawn(move || {
            while !shutdown.load(Ordering::SeqCst) {
                match fetch() {
                    Ok(snapshot) => {
                        let block = snapshot.block();
                        let size = snapshot.len();
                        if handle.advance(snapshot) {
                            tracing::debug!(block, size, "snapshot refreshed");
                        } else {
                            tracing::warn!(block, "ignoring snapshot older than the current one");
                        }
                    }
                    Err(err) => {
                        tracing::warn!(%err, "snapshot refresh failed; keeping previous snapshot");
                    }
                }
                let mut waited = Duration::ZERO;
                while waited < interval && !shutdown.load(Ordering::SeqCst) {
                    let step = SHUTDOWN_POLL.min(interval - waited);
                    thread::sleep(step);
                    waited += step;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    fn ids(names: &[&str]) -> Vec<Identity> {
        names.iter().map(|n| Identity::from(*n)).collect()
    }

    fn snap(block: u64) -> NetworkSnapshot {
        NetworkSnapshot::new(
            block,
            ids(&["a", "b", "c"]),
            vec![1.0, 2.0, 0.0],
            vec![true, false, false],
        )
        .unwrap()
    }

    #[test]
    fn lookups_follow_index_order() {
        let s = snap(10);
        assert_eq!(s.uid_of("b"), Some(1));
        assert_eq!(s.stake(1), Some(2.0));
        assert!(s.has_validator_permit(0));
        assert!(!s.has_validator_permit(1));
        assert!(!s.has_validator_permit(99));
        assert!(!s.is_registered("zed"));
    }

    #[test]
    fn duplicate_identity_keeps_first_uid() {
        let s = NetworkSnapshot::new(1, ids(&["a", "a"]), vec![1.0, 5.0], vec![false, true])
            .unwrap();
        assert_eq!(s.uid_of("a"), Some(0));
    }

    #[test]
    fn rejects_misaligned_vectors() {
        let err = NetworkSnapshot::new(1, ids(&["a", "b"]), vec![1.0], vec![true, true])
            .unwrap_err();
        assert_eq!(
            err,
            SnapshotError::LengthMismatch {
                identities: 2,
                stake: 1,
                permits: 2
            }
        );
    }

    #[test]
    fn rejects_negative_stake() {
        let err = NetworkSnapshot::new(1, ids(&["a"]), vec![-1.0], vec![true]).unwrap_err();
        assert!(matches!(err, SnapshotError::InvalidStake { uid: 0, .. }));
    }

    #[test]
    fn handle_never_moves_backwards() {
        let handle = SnapshotHandle::new();
        assert!(handle.current().is_none());
        assert!(handle.advance(snap(10)));
        assert!(!handle.advance(snap(9)));
        assert_eq!(handle.current().unwrap().block(), 10);
        assert!(handle.advance(snap(10)));
        handle.replace(snap(3));
        assert_eq!(handle.current().unwrap().block(), 3);
        handle.clear();
        assert!(handle.current().is_none());
    }

    #[test]
    fn readers_keep_their_snapshot_across_swaps() {
        let handle = SnapshotHandle::with_snapshot(snap(1));
        let held = handle.current().unwrap();
        handle.replace(snap(2));
        assert_eq!(held.block(), 1);
        assert_eq!(handle.current().unwrap().block(), 2);
    }

    #[test]
    fn refresher_installs_fetched_snapshots_and_stops() {
        let handle = Arc::new(SnapshotHandle::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let calls = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&calls);
        let join = SnapshotRefresher::spawn(
            Arc::clone(&handle),
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n == 1 {
                    Err("rpc unavailable")
                } else {
                    Ok(snap(100 + n))
                }
            },
            Duration::from_millis(5),
            Arc::clone(&shutdown),
        );
        while calls.load(Ordering::SeqCst) < 4 {
            thread::sleep(Duration::from_millis(5));
        }
        shutdown.store(true, Ordering::SeqCst);
        join.join().unwrap();
        let block = handle.current().unwrap().block();
        assert!(block >= 102, "block {block}");
    }

    #[test]
    fn configured_interval_paces_fetches() {
        let handle = Arc::new(SnapshotHandle::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let calls = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&calls);
        let cfg = SnapshotConfig {
            refresh_interval_secs: 3_600,
        };
        let join = SnapshotRefresher::spawn_with_config(
            Arc::clone(&handle),
            move || -> Result<NetworkSnapshot, String> {
                Ok(snap(7 + counter.fetch_add(1, Ordering::SeqCst)))
            },
            &cfg,
            Arc::clone(&shutdown),
        );
        while handle.current().is_none() {
            thread::sleep(Duration::from_millis(5));
        }
        thread::sleep(Duration::from_millis(200));
        shutdown.store(true, Ordering::SeqCst);
        join.join().unwrap();
        // one fetch up front, the next one is an hour away
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(handle.current().unwrap().block(), 7);
    }
}
