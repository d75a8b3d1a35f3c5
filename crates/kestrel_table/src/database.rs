//! The database context: settings, the store and transaction engine
//! handles, the shared lock monitor, the deadlock-detection mutex, the
//! table registry and the schema-object registry. A handle to this value
//! is threaded through every operation; there is no global state.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use kestrel_common::config::DbSettings;
use kestrel_common::error::{DbError, DbResult};
use kestrel_common::schema::TableSchema;
use kestrel_common::types::{IndexId, SessionId, TableId};
use kestrel_store::{Store, TransactionEngine};

use crate::lock::LockMonitor;
use crate::session::Session;
use crate::table::Table;

/// Receives index-build progress, keyed `"<table>:<index>"`.
pub trait ProgressListener: Send + Sync {
    fn index_build_progress(&self, target: &str, current: u64, total: u64);
}

pub struct Database {
    settings: DbSettings,
    store: Arc<Store>,
    txn_engine: Arc<TransactionEngine>,
    /// Source of `last_modification_id` values; strictly increasing.
    modification_counter: AtomicU64,
    /// True while the engine replays existing storage at startup; blocks
    /// main-column promotion for indexes whose map already exists.
    starting: AtomicBool,
    /// The database-wide monitor used by every table in single-threaded
    /// mode.
    shared_monitor: Arc<LockMonitor>,
    /// Serializes deadlock detection across all tables.
    deadlock_lock: Mutex<()>,
    next_session_id: AtomicU64,
    tables: DashMap<TableId, Arc<Table>>,
    schema: SchemaRegistry,
    progress: RwLock<Option<Box<dyn ProgressListener>>>,
}

impl Database {
    pub fn new(settings: DbSettings) -> Arc<Self> {
        Arc::new(Self {
            settings,
            store: Arc::new(Store::new()),
            txn_engine: Arc::new(TransactionEngine::new()),
            modification_counter: AtomicU64::new(0),
            starting: AtomicBool::new(false),
            shared_monitor: Arc::new(LockMonitor::new()),
            deadlock_lock: Mutex::new(()),
            next_session_id: AtomicU64::new(1),
            tables: DashMap::new(),
            schema: SchemaRegistry::new(),
            progress: RwLock::new(None),
        })
    }

    pub fn settings(&self) -> &DbSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn txn_engine(&self) -> &Arc<TransactionEngine> {
        &self.txn_engine
    }

    /// Allocate the next modification id. Monotonically increasing across
    /// the whole database.
    pub fn next_modification_id(&self) -> u64 {
        self.modification_counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_starting(&self) -> bool {
        self.starting.load(Ordering::Acquire)
    }

    pub fn set_starting(&self, starting: bool) {
        self.starting.store(starting, Ordering::Release);
    }

    pub(crate) fn shared_monitor(&self) -> &Arc<LockMonitor> {
        &self.shared_monitor
    }

    pub(crate) fn deadlock_lock(&self) -> &Mutex<()> {
        &self.deadlock_lock
    }

    pub fn create_session(self: &Arc<Self>, lock_timeout_ms: Option<u64>) -> Arc<Session> {
        let id = SessionId(self.next_session_id.fetch_add(1, Ordering::SeqCst));
        let timeout = lock_timeout_ms.unwrap_or(self.settings.default_lock_timeout_ms);
        Session::new(Arc::clone(self), id, timeout)
    }

    /// Create a table, initialize its primary index and register it.
    pub fn create_table(
        self: &Arc<Self>,
        session: &Arc<Session>,
        schema: TableSchema,
    ) -> DbResult<Arc<Table>> {
        let table = Table::new(self, schema);
        table.init(session)?;
        self.tables.insert(table.id(), Arc::clone(&table));
        Ok(table)
    }

    pub fn get_table(&self, id: TableId) -> DbResult<Arc<Table>> {
        self.tables
            .get(&id)
            .map(|e| Arc::clone(e.value()))
            .ok_or(DbError::TableNotFound(id))
    }

    /// Drop a table: release its resources in order, then its meta entry.
    pub fn drop_table(&self, session: &Arc<Session>, id: TableId) -> DbResult<()> {
        let table = self.get_table(id)?;
        table.remove_children_and_resources(session)
    }

    /// Remove the table's meta entry from the registry. Called last during
    /// drop, after the table's storage is gone.
    pub(crate) fn remove_table_meta(&self, id: TableId) {
        self.tables.remove(&id);
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    pub fn set_progress_listener(&self, listener: Box<dyn ProgressListener>) {
        *self.progress.write() = Some(listener);
    }

    pub(crate) fn report_progress(&self, target: &str, current: u64, total: u64) {
        if let Some(listener) = self.progress.read().as_ref() {
            listener.index_build_progress(target, current, total);
        }
    }
}

/// Minimal schema-object registry: unique names for schema-visible indexes
/// and the table each belongs to.
pub struct SchemaRegistry {
    objects: DashMap<String, (IndexId, TableId)>,
    reserved: Mutex<HashSet<String>>,
}

impl SchemaRegistry {
    fn new() -> Self {
        Self {
            objects: DashMap::new(),
            reserved: Mutex::new(HashSet::new()),
        }
    }

    /// Reserve an object name for a DDL operation in flight. Returns false
    /// if the name is taken.
    pub fn reserve_unique_name(&self, name: &str) -> bool {
        if self.objects.contains_key(name) {
            return false;
        }
        self.reserved.lock().insert(name.to_string())
    }

    /// Release a name reserved by a DDL operation that did not complete.
    pub fn free_unique_name(&self, name: &str) {
        self.reserved.lock().remove(name);
    }

    pub fn add_schema_object(&self, name: &str, index: IndexId, table: TableId) {
        self.reserved.lock().remove(name);
        self.objects.insert(name.to_string(), (index, table));
    }

    pub fn remove_schema_object(&self, name: &str) -> Option<(IndexId, TableId)> {
        self.objects.remove(name).map(|(_, v)| v)
    }

    /// Any schema-visible index still registered for `table`. Used by the
    /// drop path's internal check.
    pub fn index_for_table(&self, table: TableId) -> Option<String> {
        self.objects
            .iter()
            .find(|e| e.value().1 == table)
            .map(|e| e.key().clone())
    }
}
