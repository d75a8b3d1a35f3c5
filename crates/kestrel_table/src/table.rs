//! The table facade.
//!
//! A table owns its index set and routes every mutation through all of it
//! under one transaction savepoint: a failure in any index rolls the whole
//! statement back and re-raises, so a failed `add_row` or `remove_row`
//! leaves every index exactly as it was. Locking lives in [`crate::lock`],
//! index construction in the builder, statistics in [`crate::analyze`].

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use kestrel_common::datum::Row;
use kestrel_common::error::{DbError, DbResult};
use kestrel_common::schema::{IndexColumn, SortOrder, TableSchema};
use kestrel_common::types::{IndexId, RowId, TableId};

use crate::analyze;
use crate::builder;
use crate::database::Database;
use crate::index::{
    DelegateIndex, IndexType, NonUniqueHashIndex, PrimaryIndex, SecondaryIndex, TableIndex,
    UniqueHashIndex,
};
use crate::lock::TableLockState;
use crate::session::Session;

/// Constraints attached to a table; the drop/truncate paths only care
/// about referential ones and which table they point to.
#[derive(Debug, Clone)]
pub enum Constraint {
    Referential { name: String, ref_table: TableId },
}

pub struct Table {
    schema: TableSchema,
    pub(crate) db: Arc<Database>,
    primary: OnceLock<Arc<PrimaryIndex>>,
    indexes: RwLock<Vec<Arc<TableIndex>>>,
    pub(crate) locks: TableLockState,
    last_modification_id: AtomicU64,
    changes_since_analyze: AtomicU32,
    next_analyze: AtomicU32,
    stats: RwLock<Option<analyze::TableStatistics>>,
    constraints: RwLock<Vec<Constraint>>,
}

impl Table {
    pub fn new(db: &Arc<Database>, schema: TableSchema) -> Arc<Self> {
        let settings = db.settings();
        let monitor = if settings.multi_threaded {
            Arc::new(crate::lock::LockMonitor::new())
        } else {
            Arc::clone(db.shared_monitor())
        };
        Arc::new(Self {
            schema,
            db: Arc::clone(db),
            primary: OnceLock::new(),
            indexes: RwLock::new(Vec::new()),
            locks: TableLockState::new(monitor),
            last_modification_id: AtomicU64::new(0),
            changes_since_analyze: AtomicU32::new(0),
            next_analyze: AtomicU32::new(settings.analyze_auto),
            stats: RwLock::new(None),
            constraints: RwLock::new(Vec::new()),
        })
    }

    /// Create the primary index. Must run once before any other operation.
    pub fn init(&self, _session: &Arc<Session>) -> DbResult<()> {
        let columns = (0..self.schema.columns.len()).map(IndexColumn::asc).collect();
        let primary =
            PrimaryIndex::open(self.db.store(), &self.schema.name, self.schema.id.0, columns)?;
        self.primary
            .set(Arc::clone(&primary))
            .map_err(|_| DbError::internal(format!("table {} already initialized", self.name())))?;
        self.indexes.write().push(Arc::new(TableIndex::Primary(primary)));
        Ok(())
    }

    pub fn id(&self) -> TableId {
        self.schema.id
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub(crate) fn primary(&self) -> DbResult<&Arc<PrimaryIndex>> {
        self.primary
            .get()
            .ok_or_else(|| DbError::internal(format!("table {} not initialized", self.name())))
    }

    /// Name of the primary index's backing map.
    pub fn get_map_name(&self) -> DbResult<String> {
        Ok(self.primary()?.meta().map_name())
    }

    fn bump_modification_id(&self) {
        self.last_modification_id
            .store(self.db.next_modification_id(), Ordering::SeqCst);
    }

    // ── Mutation ─────────────────────────────────────────────────────

    /// Insert a row into every index, in insertion order, under one
    /// savepoint. Returns the assigned row id.
    pub fn add_row(&self, session: &Arc<Session>, mut row: Row) -> DbResult<RowId> {
        self.bump_modification_id();
        let txn = session.transaction();
        let savepoint = txn.set_savepoint();
        for index in self.get_indexes() {
            if let Err(e) = index.add(session, &mut row) {
                if let Err(rb) = txn.rollback_to_savepoint(savepoint) {
                    tracing::error!("savepoint rollback failed after {}: {}", e, rb);
                }
                return Err(e);
            }
        }
        self.analyze_if_required(session);
        Ok(row.key)
    }

    /// Remove a row from every index, in reverse order, under one
    /// savepoint.
    pub fn remove_row(&self, session: &Arc<Session>, row: &Row) -> DbResult<()> {
        self.bump_modification_id();
        let txn = session.transaction();
        let savepoint = txn.set_savepoint();
        for index in self.get_indexes().iter().rev() {
            if let Err(e) = index.remove(session, row) {
                if let Err(rb) = txn.rollback_to_savepoint(savepoint) {
                    tracing::error!("savepoint rollback failed after {}: {}", e, rb);
                }
                return Err(e);
            }
        }
        self.analyze_if_required(session);
        Ok(())
    }

    /// Empty every index, in reverse order, and reset the analyze counter.
    pub fn truncate(&self, session: &Arc<Session>) -> DbResult<()> {
        self.bump_modification_id();
        for index in self.get_indexes().iter().rev() {
            index.truncate(session)?;
        }
        self.changes_since_analyze.store(0, Ordering::Relaxed);
        Ok(())
    }

    /// Point lookup through the primary index.
    pub fn get_row(&self, _session: &Arc<Session>, key: RowId) -> DbResult<Option<Row>> {
        self.primary()?.get_row(key)
    }

    // ── Index DDL ────────────────────────────────────────────────────

    /// Create an index over the table's current contents.
    ///
    /// Selection policy: a single-column integral ascending primary key
    /// promotes the primary's main index column and yields a zero-storage
    /// delegate; hash index types with at most one column yield a hash
    /// index; everything else a sorted secondary. Indexes created over
    /// existing rows are populated by the builder before becoming visible.
    pub fn add_index(
        self: &Arc<Self>,
        session: &Arc<Session>,
        index_name: &str,
        index_id: IndexId,
        columns: Vec<IndexColumn>,
        index_type: IndexType,
    ) -> DbResult<Arc<TableIndex>> {
        if index_type.primary_key {
            for ic in &columns {
                let column = &self.schema.columns[ic.column];
                if column.nullable {
                    return Err(DbError::ColumnNotNullable(column.name.clone()));
                }
            }
        }

        let store = self.db.store();
        let primary = self.primary()?;
        let mut main_column = self.main_index_column_for(&index_type, &columns);
        if self.db.is_starting() {
            if store.has_map(&format!("index.{}", index_id.0)) {
                // an existing store under this id was written without
                // promotion; honor its layout
                main_column = None;
            }
        } else if primary.row_count_max() != 0 {
            main_column = None;
        }

        self.db.schema().reserve_unique_name(index_name);
        let index = if let Some(column) = main_column {
            primary.set_main_index_column(column);
            TableIndex::Delegate(DelegateIndex::new(
                index_id,
                index_name.to_string(),
                index_type,
                Arc::clone(primary),
            )?)
        } else if index_type.hash && columns.len() <= 1 {
            if index_type.unique {
                TableIndex::HashUnique(UniqueHashIndex::open(
                    store,
                    index_id,
                    index_name.to_string(),
                    index_type,
                    columns,
                    Arc::clone(primary),
                )?)
            } else {
                TableIndex::HashNonUnique(NonUniqueHashIndex::open(
                    store,
                    index_id,
                    index_name.to_string(),
                    index_type,
                    columns,
                    Arc::clone(primary),
                )?)
            }
        } else {
            TableIndex::Secondary(SecondaryIndex::open(
                store,
                index_id,
                index_name.to_string(),
                index_type,
                columns,
                Arc::clone(primary),
            )?)
        };

        let index = Arc::new(index);
        if index.needs_rebuild() {
            builder::rebuild_index(session, self, &index)?;
        }
        if self.schema.is_session_temporary() {
            self.db.schema().free_unique_name(index_name);
        } else {
            self.db.schema().add_schema_object(index_name, index_id, self.id());
        }
        self.indexes.write().push(Arc::clone(&index));
        self.bump_modification_id();
        Ok(index)
    }

    fn main_index_column_for(
        &self,
        index_type: &IndexType,
        columns: &[IndexColumn],
    ) -> Option<usize> {
        let primary = self.primary.get()?;
        if primary.main_index_column().is_some() {
            return None;
        }
        if !index_type.primary_key || columns.len() != 1 {
            return None;
        }
        let first = &columns[0];
        if first.sort != SortOrder::Ascending {
            return None;
        }
        if !self.schema.columns[first.column].data_type.is_integer() {
            return None;
        }
        Some(first.column)
    }

    /// Drop a non-primary index: its schema entry, then its storage.
    pub fn remove_index(&self, session: &Arc<Session>, index_name: &str) -> DbResult<()> {
        let index = {
            let mut indexes = self.indexes.write();
            let pos = indexes
                .iter()
                .position(|i| i.name() == index_name)
                .ok_or_else(|| {
                    DbError::internal(format!("index {} not found on {}", index_name, self.name()))
                })?;
            if pos == 0 {
                return Err(DbError::internal("cannot drop the primary index"));
            }
            indexes.remove(pos)
        };
        self.db.schema().remove_schema_object(index_name);
        index.drop_storage(session)?;
        self.bump_modification_id();
        Ok(())
    }

    // ── Index access ─────────────────────────────────────────────────

    /// The clustered primary index, as the table's full-scan source.
    pub fn get_scan_index(&self) -> DbResult<Arc<TableIndex>> {
        let indexes = self.indexes.read();
        indexes
            .first()
            .map(Arc::clone)
            .ok_or_else(|| DbError::internal(format!("table {} not initialized", self.name())))
    }

    pub fn get_unique_index(&self) -> DbResult<Arc<TableIndex>> {
        self.get_scan_index()
    }

    pub fn get_indexes(&self) -> Vec<Arc<TableIndex>> {
        self.indexes.read().clone()
    }

    // ── Counters and lifecycle ───────────────────────────────────────

    pub fn row_count(&self, session: &Arc<Session>) -> DbResult<u64> {
        Ok(self.primary()?.row_count(session))
    }

    pub fn row_count_approx(&self) -> u64 {
        self.primary.get().map_or(0, |p| p.row_count_approx())
    }

    pub fn disk_space_used(&self) -> u64 {
        self.primary.get().map_or(0, |p| p.disk_space_used())
    }

    pub fn max_data_modification_id(&self) -> u64 {
        self.last_modification_id.load(Ordering::SeqCst)
    }

    /// Mark a transaction on this table as committed, advancing the
    /// modification counter.
    pub fn commit(&self) {
        self.bump_modification_id();
    }

    pub fn can_drop(&self) -> bool {
        true
    }

    /// False iff a referential constraint points *to* this table.
    pub fn can_truncate(&self) -> bool {
        if self.db.settings().referential_integrity {
            let constraints = self.constraints.read();
            for constraint in constraints.iter() {
                let Constraint::Referential { ref_table, .. } = constraint;
                if *ref_table == self.id() {
                    return false;
                }
            }
        }
        true
    }

    pub fn add_constraint(&self, constraint: Constraint) {
        self.constraints.write().push(constraint);
    }

    pub fn constraints(&self) -> Vec<Constraint> {
        self.constraints.read().clone()
    }

    /// Drop everything the table owns, in dependency order: schema-visible
    /// secondary indexes first, then the primary, then the meta entry.
    pub fn remove_children_and_resources(&self, session: &Arc<Session>) -> DbResult<()> {
        {
            let mut indexes = self.indexes.write();
            while indexes.len() > 1 {
                let index = indexes.remove(1);
                self.db.schema().remove_schema_object(index.name());
                index.drop_storage(session)?;
            }
        }
        if let Some(name) = self.db.schema().index_for_table(self.id()) {
            return Err(DbError::internal(format!("index not dropped: {}", name)));
        }
        self.primary()?.drop_storage(session)?;
        self.db.remove_table_meta(self.id());
        Ok(())
    }

    // ── Analyze trigger ──────────────────────────────────────────────

    /// After every mutation: once enough changes accumulate, resample the
    /// table statistics and double the threshold (saturating).
    fn analyze_if_required(&self, session: &Arc<Session>) {
        let next = self.next_analyze.load(Ordering::Relaxed);
        if next == 0 {
            return;
        }
        let changes = self.changes_since_analyze.fetch_add(1, Ordering::Relaxed) + 1;
        if changes < next {
            return;
        }
        self.changes_since_analyze.store(0, Ordering::Relaxed);
        if let Some(doubled) = next.checked_mul(2) {
            self.next_analyze.store(doubled, Ordering::Relaxed);
        }
        let sample = self.db.settings().analyze_sample / 10;
        if let Err(e) = analyze::analyze_table(session, self, sample as u64) {
            tracing::warn!("analyze of {} failed: {}", self.name(), e);
        }
    }

    /// Current adaptive analyze threshold (diagnostics).
    pub fn analyze_cadence(&self) -> u32 {
        self.next_analyze.load(Ordering::Relaxed)
    }

    pub fn statistics(&self) -> Option<analyze::TableStatistics> {
        self.stats.read().clone()
    }

    pub(crate) fn set_statistics(&self, stats: analyze::TableStatistics) {
        *self.stats.write() = Some(stats);
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("id", &self.id())
            .field("name", &self.name())
            .finish()
    }
}
