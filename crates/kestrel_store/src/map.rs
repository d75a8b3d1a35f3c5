//! Named byte maps. Ordered maps back persistent indexes and support the
//! lazy bounded range probes index cursors are built on; hash maps back the
//! in-memory hash indexes and support point lookups only.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};

/// Map keys and values are opaque byte strings; ordered maps compare keys
/// lexicographically, which the datum encoding makes order-preserving.
pub type Key = Vec<u8>;
pub type Val = Vec<u8>;

/// Smallest byte string strictly greater than every key starting with
/// `prefix`: the prefix with its last non-0xFF byte incremented. `None`
/// when every byte is 0xFF (the range is unbounded above).
pub fn upper_bound_exclusive(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut upper = prefix.to_vec();
    while let Some(last) = upper.last_mut() {
        if *last == 0xFF {
            upper.pop();
        } else {
            *last += 1;
            return Some(upper);
        }
    }
    None
}

#[derive(Debug)]
enum MapInner {
    Ordered(RwLock<BTreeMap<Key, Val>>),
    Hash(RwLock<HashMap<Key, Val>>),
}

/// A single named map inside the store.
///
/// Alongside the data, each map keeps a byte-usage counter (disk-usage
/// accounting) and a pending-writer registry: `key → transaction id` for
/// every key with an uncommitted write, so unique-index conflicts can be
/// attributed to a committed row or to another live transaction.
#[derive(Debug)]
pub struct StoreMap {
    name: String,
    inner: MapInner,
    bytes: AtomicU64,
    pending: Mutex<HashMap<Key, u64>>,
}

impl StoreMap {
    pub(crate) fn new_ordered(name: String) -> Self {
        Self {
            name,
            inner: MapInner::Ordered(RwLock::new(BTreeMap::new())),
            bytes: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn new_hash(name: String) -> Self {
        Self {
            name,
            inner: MapInner::Hash(RwLock::new(HashMap::new())),
            bytes: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_ordered(&self) -> bool {
        matches!(self.inner, MapInner::Ordered(_))
    }

    // ── Point operations ─────────────────────────────────────────────

    pub fn get(&self, key: &[u8]) -> Option<Val> {
        match &self.inner {
            MapInner::Ordered(m) => m.read().get(key).cloned(),
            MapInner::Hash(m) => m.read().get(key).cloned(),
        }
    }

    pub fn contains_key(&self, key: &[u8]) -> bool {
        match &self.inner {
            MapInner::Ordered(m) => m.read().contains_key(key),
            MapInner::Hash(m) => m.read().contains_key(key),
        }
    }

    /// Insert, returning the previous value if any.
    pub fn insert(&self, key: Key, value: Val) -> Option<Val> {
        let key_len = key.len() as u64;
        let added = key_len + value.len() as u64;
        let prev = match &self.inner {
            MapInner::Ordered(m) => m.write().insert(key, value),
            MapInner::Hash(m) => m.write().insert(key, value),
        };
        self.bytes.fetch_add(added, Ordering::Relaxed);
        if let Some(old) = &prev {
            // the key was already accounted for by the first insert
            self.bytes.fetch_sub(key_len + old.len() as u64, Ordering::Relaxed);
        }
        prev
    }

    /// Remove, returning the previous value if any.
    pub fn remove(&self, key: &[u8]) -> Option<Val> {
        let prev = match &self.inner {
            MapInner::Ordered(m) => m.write().remove(key),
            MapInner::Hash(m) => m.write().remove(key),
        };
        if let Some(old) = &prev {
            self.bytes.fetch_sub((key.len() + old.len()) as u64, Ordering::Relaxed);
        }
        prev
    }

    // ── Size accounting ──────────────────────────────────────────────

    /// Exact entry count. Doubles as the approximation the core exposes;
    /// the in-memory substrate has no cheaper estimate to offer.
    pub fn len(&self) -> usize {
        match &self.inner {
            MapInner::Ordered(m) => m.read().len(),
            MapInner::Hash(m) => m.read().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Approximate key+value bytes held by this map.
    pub fn bytes_used(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Snapshot of all keys, in map order for ordered maps.
    pub fn keys(&self) -> Vec<Key> {
        match &self.inner {
            MapInner::Ordered(m) => m.read().keys().cloned().collect(),
            MapInner::Hash(m) => m.read().keys().cloned().collect(),
        }
    }

    // ── Range probes (ordered maps only) ─────────────────────────────

    /// First entry with key ≥ `lower`, bounded by the optional exclusive
    /// `upper`. Returns `None` on hash maps.
    pub fn first_at_or_after(&self, lower: &[u8], upper: Option<&[u8]>) -> Option<(Key, Val)> {
        self.probe(Bound::Included(lower), upper)
    }

    /// First entry with key strictly greater than `key`, bounded by the
    /// optional exclusive `upper`. Returns `None` on hash maps.
    pub fn next_after(&self, key: &[u8], upper: Option<&[u8]>) -> Option<(Key, Val)> {
        self.probe(Bound::Excluded(key), upper)
    }

    /// Largest key in an ordered map. Returns `None` on hash maps.
    pub fn last_key(&self) -> Option<Key> {
        let MapInner::Ordered(m) = &self.inner else {
            return None;
        };
        m.read().keys().next_back().cloned()
    }

    fn probe(&self, lower: Bound<&[u8]>, upper: Option<&[u8]>) -> Option<(Key, Val)> {
        let MapInner::Ordered(m) = &self.inner else {
            return None;
        };
        let guard = m.read();
        let (k, v) = guard.range::<[u8], _>((lower, Bound::Unbounded)).next()?;
        if let Some(upper) = upper {
            if k.as_slice() >= upper {
                return None;
            }
        }
        Some((k.clone(), v.clone()))
    }

    // ── Pending-writer registry ──────────────────────────────────────

    /// Transaction id of the uncommitted write on `key`, if any.
    pub fn pending_owner(&self, key: &[u8]) -> Option<u64> {
        self.pending.lock().get(key).copied()
    }

    pub(crate) fn mark_pending(&self, key: &[u8], txn_id: u64) {
        self.pending.lock().entry(key.to_vec()).or_insert(txn_id);
    }

    pub(crate) fn clear_pending(&self, key: &[u8], txn_id: u64) {
        let mut pending = self.pending.lock();
        if pending.get(key) == Some(&txn_id) {
            pending.remove(key);
        }
    }
}
