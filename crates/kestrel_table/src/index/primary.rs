//! The clustered primary index: `row id → row`, one per table, also the
//! full-scan source.
//!
//! When a single-column integral ascending primary key is designated as the
//! "main index column", the row id *is* that column's value, and lookups on
//! the column skip a level of indirection (served here or through a
//! delegate index).

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use kestrel_common::datum::{encode_row_id, Datum, Row};
use kestrel_common::error::{DbError, DbResult, StoreError};
use kestrel_common::schema::IndexColumn;
use kestrel_common::types::{IndexId, RowId};
use kestrel_store::{Store, StoreMap};

use crate::session::Session;

use super::cursor::{Cursor, RangeCursor};
use super::{IndexMeta, IndexType};

/// Sentinel for "no main index column".
const NO_MAIN_COLUMN: i64 = -1;

#[derive(Debug)]
pub struct PrimaryIndex {
    meta: IndexMeta,
    store: Arc<Store>,
    map: Arc<StoreMap>,
    /// Highest row id ever handed out by this index.
    last_key: AtomicI64,
    /// Column position of the main index column, or -1.
    main_index_column: AtomicI64,
}

impl PrimaryIndex {
    /// Open the primary index of a table. The backing map shares the
    /// table's id: `index.<table id>`.
    pub fn open(
        store: &Arc<Store>,
        table_name: &str,
        table_id: u64,
        columns: Vec<IndexColumn>,
    ) -> DbResult<Arc<Self>> {
        let meta = IndexMeta {
            id: IndexId(table_id),
            name: format!("{}_DATA", table_name),
            table_name: table_name.to_string(),
            columns,
            index_type: IndexType::scan(),
        };
        let map = store.open_map(&meta.map_name())?;
        let last_key = map
            .last_key()
            .and_then(|k| kestrel_common::datum::decode_row_id(&k))
            .map_or(0, |id| id.0);
        Ok(Arc::new(Self {
            meta,
            store: Arc::clone(store),
            map,
            last_key: AtomicI64::new(last_key),
            main_index_column: AtomicI64::new(NO_MAIN_COLUMN),
        }))
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    pub fn main_index_column(&self) -> Option<usize> {
        match self.main_index_column.load(Ordering::Acquire) {
            NO_MAIN_COLUMN => None,
            col => Some(col as usize),
        }
    }

    pub(crate) fn set_main_index_column(&self, column: usize) {
        self.main_index_column.store(column as i64, Ordering::Release);
    }

    /// Highest row id ever allocated. Non-zero means the map has contained
    /// rows at some point, which blocks main-column promotion.
    pub fn row_count_max(&self) -> i64 {
        self.last_key.load(Ordering::Acquire)
    }

    pub fn add(&self, session: &Arc<Session>, row: &mut Row) -> DbResult<()> {
        if let Some(col) = self.main_index_column() {
            let value = row.get(col).as_i64().ok_or_else(|| {
                DbError::internal(format!(
                    "main index column of {} is not integral",
                    self.meta.table_name
                ))
            })?;
            row.key = RowId(value);
            let max = self.last_key.load(Ordering::Acquire).max(value);
            self.last_key.store(max, Ordering::Release);
        } else if row.key.0 == 0 {
            row.key = RowId(self.last_key.fetch_add(1, Ordering::SeqCst) + 1);
        }

        let mut key = Vec::with_capacity(9);
        encode_row_id(row.key, &mut key);
        if self.map.contains_key(&key) {
            if self.main_index_column().is_some() {
                return Err(self.conflict_error(session, &key, row));
            }
            return Err(DbError::internal(format!(
                "duplicate row id {} in {}",
                row.key, self.meta.name
            )));
        }

        let value = bincode::serialize(row)
            .map_err(|e| DbError::from(StoreError::Serialization(e.to_string())))?;
        session.transaction().put(&self.map, key, value)?;
        Ok(())
    }

    /// A conflicting entry under a promoted primary key is a duplicate key,
    /// unless it is still uncommitted in another session's transaction.
    fn conflict_error(&self, session: &Arc<Session>, key: &[u8], row: &Row) -> DbError {
        if let Some(owner) = self.map.pending_owner(key) {
            if owner != session.transaction().id() {
                return DbError::ConcurrentUpdate(self.meta.name.clone());
            }
        }
        DbError::DuplicateKey { index: self.meta.name.clone(), key: row.key.to_string() }
    }

    pub fn remove(&self, session: &Arc<Session>, row: &Row) -> DbResult<()> {
        let mut key = Vec::with_capacity(9);
        encode_row_id(row.key, &mut key);
        let prev = session.transaction().remove(&self.map, &key)?;
        if prev.is_none() {
            return Err(DbError::internal(format!(
                "row {} not found when deleting from {}",
                row.key, self.meta.name
            )));
        }
        Ok(())
    }

    pub fn truncate(&self, session: &Arc<Session>) -> DbResult<()> {
        let txn = session.transaction();
        for key in self.map.keys() {
            txn.remove(&self.map, &key)?;
        }
        Ok(())
    }

    pub fn find(
        &self,
        session: &Arc<Session>,
        first: Option<&[Datum]>,
        last: Option<&[Datum]>,
    ) -> DbResult<Cursor> {
        let lower = match bound_row_id(first) {
            Some(id) => {
                let mut buf = Vec::with_capacity(9);
                encode_row_id(id, &mut buf);
                buf
            }
            None => Vec::new(),
        };
        // the upper bound is inclusive: step past the encoded row id
        let upper = bound_row_id(last).and_then(|id| {
            let mut buf = Vec::with_capacity(9);
            encode_row_id(id, &mut buf);
            kestrel_store::map::upper_bound_exclusive(&buf)
        });
        Ok(Cursor::Primary(RangeCursor::new(
            session.transaction(),
            Arc::clone(&self.map),
            lower,
            upper,
        )))
    }

    /// Point lookup by row id.
    pub fn get_row(&self, key: RowId) -> DbResult<Option<Row>> {
        let mut buf = Vec::with_capacity(9);
        encode_row_id(key, &mut buf);
        match self.map.get(&buf) {
            None => Ok(None),
            Some(value) => {
                let row = bincode::deserialize(&value).map_err(|e| {
                    DbError::from(StoreError::Corrupt {
                        map: self.map.name().to_string(),
                        detail: e.to_string(),
                    })
                })?;
                Ok(Some(row))
            }
        }
    }

    pub fn row_count(&self, _session: &Arc<Session>) -> u64 {
        self.map.len() as u64
    }

    pub fn row_count_approx(&self) -> u64 {
        self.map.len() as u64
    }

    /// The primary orders rows by their internal id.
    pub fn compare_rows(&self, a: &Row, b: &Row) -> std::cmp::Ordering {
        a.key.cmp(&b.key)
    }

    pub fn drop_storage(&self, _session: &Arc<Session>) -> DbResult<()> {
        self.store.remove_map(&self.meta.map_name());
        Ok(())
    }

    pub fn disk_space_used(&self) -> u64 {
        self.map.bytes_used()
    }
}

fn bound_row_id(bound: Option<&[Datum]>) -> Option<RowId> {
    let datum = bound?.first()?;
    datum.as_i64().map(RowId)
}
