//! Sessions. One per connection, owned by the connection layer; the table
//! core sees them as the carrier of the current transaction, the set of
//! held table locks, and the wait-for slot the deadlock detector walks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use kestrel_common::types::SessionId;
use kestrel_store::Transaction;

use crate::database::Database;
use crate::table::Table;

pub struct Session {
    id: SessionId,
    db: Arc<Database>,
    txn: Mutex<Option<Arc<Transaction>>>,
    locks: Mutex<Vec<Arc<Table>>>,
    /// The table this session is currently queued on, if any. Non-owning;
    /// cleared on every exit path from the lock acquire loop.
    wait_for: Mutex<Option<Weak<Table>>>,
    lock_timeout_ms: AtomicU64,
}

impl Session {
    pub(crate) fn new(db: Arc<Database>, id: SessionId, lock_timeout_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            id,
            db,
            txn: Mutex::new(None),
            locks: Mutex::new(Vec::new()),
            wait_for: Mutex::new(None),
            lock_timeout_ms: AtomicU64::new(lock_timeout_ms),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// The session's current transaction, starting one if none is open.
    pub fn transaction(&self) -> Arc<Transaction> {
        let mut guard = self.txn.lock();
        match &*guard {
            Some(t) if !t.is_closed() => Arc::clone(t),
            _ => {
                let t = self.db.txn_engine().begin();
                *guard = Some(Arc::clone(&t));
                t
            }
        }
    }

    /// Commit the current transaction and release all table locks.
    pub fn commit(&self) {
        if let Some(t) = self.txn.lock().take() {
            t.commit();
        }
        for table in self.held_locks() {
            table.commit();
        }
        self.unlock_all();
    }

    /// Roll back the current transaction and release all table locks.
    pub fn rollback(&self) {
        if let Some(t) = self.txn.lock().take() {
            t.rollback();
        }
        self.unlock_all();
    }

    /// Release every table lock this session holds.
    pub fn unlock_all(&self) {
        let tables: Vec<Arc<Table>> = self.locks.lock().drain(..).collect();
        for table in tables {
            table.unlock(self);
        }
    }

    pub fn lock_timeout_ms(&self) -> u64 {
        self.lock_timeout_ms.load(Ordering::Relaxed)
    }

    pub fn set_lock_timeout_ms(&self, ms: u64) {
        self.lock_timeout_ms.store(ms, Ordering::Relaxed);
    }

    pub(crate) fn add_lock(&self, table: &Arc<Table>) {
        let mut locks = self.locks.lock();
        if !locks.iter().any(|t| t.id() == table.id()) {
            locks.push(Arc::clone(table));
        }
    }

    pub(crate) fn forget_lock(&self, table: &Table) {
        self.locks.lock().retain(|t| t.id() != table.id());
    }

    /// Tables locked by this session, shared and exclusive alike.
    pub fn held_locks(&self) -> Vec<Arc<Table>> {
        self.locks.lock().clone()
    }

    pub(crate) fn set_wait_for(&self, table: Option<Weak<Table>>) {
        *self.wait_for.lock() = table;
    }

    /// The table this session is waiting to lock, if it is queued.
    pub fn wait_for_table(&self) -> Option<Arc<Table>> {
        self.wait_for.lock().as_ref().and_then(Weak::upgrade)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("id", &self.id).finish()
    }
}
