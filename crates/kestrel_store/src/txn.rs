//! Savepoint transactions over store maps.
//!
//! Every mutation made through a `Transaction` is recorded in an undo log;
//! `set_savepoint` captures the log length and `rollback_to_savepoint`
//! reverts past it, newest entry first. The table core uses one savepoint
//! per statement so a failed mutation leaves every index untouched.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use kestrel_common::error::{StoreError, StoreResult};

use crate::map::StoreMap;

/// Hands out transactions. Sessions hold at most one open transaction.
pub struct TransactionEngine {
    next_id: AtomicU64,
}

impl Default for TransactionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionEngine {
    pub fn new() -> Self {
        Self { next_id: AtomicU64::new(1) }
    }

    pub fn begin(&self) -> Arc<Transaction> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("txn begin: {}", id);
        Arc::new(Transaction {
            id,
            undo: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }
}

#[derive(Debug)]
struct UndoEntry {
    map: Arc<StoreMap>,
    key: Vec<u8>,
    prev: Option<Vec<u8>>,
}

/// Savepoint marker returned by [`Transaction::set_savepoint`].
pub type Savepoint = u64;

#[derive(Debug)]
pub struct Transaction {
    id: u64,
    undo: Mutex<Vec<UndoEntry>>,
    closed: AtomicBool,
}

impl Transaction {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.is_closed() {
            return Err(StoreError::TransactionClosed);
        }
        Ok(())
    }

    /// Write `key → value` into `map`, recording the previous value for undo
    /// and marking the key as pending under this transaction.
    pub fn put(&self, map: &Arc<StoreMap>, key: Vec<u8>, value: Vec<u8>) -> StoreResult<()> {
        self.ensure_open()?;
        let prev = map.insert(key.clone(), value);
        map.mark_pending(&key, self.id);
        self.undo.lock().push(UndoEntry { map: Arc::clone(map), key, prev });
        Ok(())
    }

    /// Remove `key` from `map`, recording the previous value for undo.
    /// Returns the removed value.
    pub fn remove(&self, map: &Arc<StoreMap>, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        self.ensure_open()?;
        let prev = map.remove(key);
        map.mark_pending(key, self.id);
        self.undo.lock().push(UndoEntry {
            map: Arc::clone(map),
            key: key.to_vec(),
            prev: prev.clone(),
        });
        Ok(prev)
    }

    /// Capture the current undo position.
    pub fn set_savepoint(&self) -> Savepoint {
        self.undo.lock().len() as Savepoint
    }

    /// Revert every change made after `savepoint`, newest first.
    pub fn rollback_to_savepoint(&self, savepoint: Savepoint) -> StoreResult<()> {
        self.ensure_open()?;
        let mut undo = self.undo.lock();
        while undo.len() as Savepoint > savepoint {
            let entry = match undo.pop() {
                Some(e) => e,
                None => break,
            };
            match entry.prev {
                Some(prev) => {
                    entry.map.insert(entry.key.clone(), prev);
                }
                None => {
                    entry.map.remove(&entry.key);
                }
            }
            entry.map.clear_pending(&entry.key, self.id);
        }
        Ok(())
    }

    /// Commit: discard the undo log and release pending-writer marks.
    /// Committing an already-closed transaction is a no-op.
    pub fn commit(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut undo = self.undo.lock();
        for entry in undo.drain(..) {
            entry.map.clear_pending(&entry.key, self.id);
        }
        tracing::debug!("txn commit: {}", self.id);
    }

    /// Roll back every change and close the transaction.
    pub fn rollback(&self) {
        if self.is_closed() {
            return;
        }
        // rollback_to_savepoint only fails on a closed transaction
        let _ = self.rollback_to_savepoint(0);
        self.closed.store(true, Ordering::Release);
        tracing::debug!("txn rollback: {}", self.id);
    }
}

#[cfg(test)]
mod txn_tests {
    use super::*;
    use crate::store::Store;

    fn setup() -> (Store, TransactionEngine) {
        (Store::new(), TransactionEngine::new())
    }

    #[test]
    fn test_savepoint_rollback_reverts_newest_first() {
        let (store, engine) = setup();
        let map = store.open_map("index.1").unwrap();
        let txn = engine.begin();

        txn.put(&map, vec![1], vec![10]).unwrap();
        let sp = txn.set_savepoint();
        txn.put(&map, vec![1], vec![11]).unwrap();
        txn.put(&map, vec![2], vec![20]).unwrap();
        txn.remove(&map, &[1]).unwrap();

        txn.rollback_to_savepoint(sp).unwrap();
        assert_eq!(map.get(&[1]), Some(vec![10]));
        assert_eq!(map.get(&[2]), None);
    }

    #[test]
    fn test_full_rollback_restores_initial_state() {
        let (store, engine) = setup();
        let map = store.open_map("index.1").unwrap();
        map.insert(vec![9], vec![90]);

        let txn = engine.begin();
        txn.put(&map, vec![9], vec![91]).unwrap();
        txn.remove(&map, &[9]).unwrap();
        txn.put(&map, vec![8], vec![80]).unwrap();
        txn.rollback();

        assert_eq!(map.get(&[9]), Some(vec![90]));
        assert_eq!(map.get(&[8]), None);
        assert!(txn.is_closed());
    }

    #[test]
    fn test_closed_transaction_rejects_writes() {
        let (store, engine) = setup();
        let map = store.open_map("index.1").unwrap();
        let txn = engine.begin();
        txn.commit();
        assert!(matches!(
            txn.put(&map, vec![1], vec![1]),
            Err(StoreError::TransactionClosed)
        ));
    }

    #[test]
    fn test_pending_marks_follow_transaction_lifecycle() {
        let (store, engine) = setup();
        let map = store.open_map("index.1").unwrap();

        let t1 = engine.begin();
        t1.put(&map, vec![1], vec![1]).unwrap();
        assert_eq!(map.pending_owner(&[1]), Some(t1.id()));

        let t2 = engine.begin();
        assert_ne!(t1.id(), t2.id());

        t1.commit();
        assert_eq!(map.pending_owner(&[1]), None);

        t2.put(&map, vec![1], vec![2]).unwrap();
        assert_eq!(map.pending_owner(&[1]), Some(t2.id()));
        t2.rollback();
        assert_eq!(map.pending_owner(&[1]), None);
        assert_eq!(map.get(&[1]), Some(vec![1]));
    }

    #[test]
    fn test_commit_is_idempotent() {
        let (_store, engine) = setup();
        let txn = engine.begin();
        txn.commit();
        txn.commit();
        assert!(txn.is_closed());
    }
}
