//! In-memory hash indexes for single-column equality lookups. Range scans
//! are rejected with `UnsupportedScan`; the indexes are rebuilt from the
//! scan index whenever the table is opened over existing data.

use std::cmp::Ordering;
use std::sync::Arc;

use kestrel_common::datum::{encode_datum, Datum, Row};
use kestrel_common::error::{DbError, DbResult, StoreError};
use kestrel_common::schema::IndexColumn;
use kestrel_common::types::{IndexId, RowId};
use kestrel_store::{Store, StoreMap};

use crate::session::Session;

use super::cursor::{Cursor, RowsCursor};
use super::primary::PrimaryIndex;
use super::{decode_row_id_value, IndexMeta, IndexType};

fn open_hash(
    store: &Arc<Store>,
    id: IndexId,
    name: String,
    index_type: IndexType,
    columns: Vec<IndexColumn>,
    primary: &Arc<PrimaryIndex>,
) -> DbResult<(IndexMeta, Arc<StoreMap>)> {
    let meta = IndexMeta {
        id,
        name,
        table_name: primary.meta().table_name.clone(),
        columns,
        index_type,
    };
    let map = store.open_hash_map(&meta.map_name())?;
    Ok((meta, map))
}

fn hash_key(row: &Row, column: usize) -> Vec<u8> {
    let mut buf = Vec::new();
    encode_datum(row.get(column), &mut buf);
    buf
}

/// Equality probes must pin both bounds to the same key.
fn probe_key(
    meta: &IndexMeta,
    first: Option<&[Datum]>,
    last: Option<&[Datum]>,
) -> DbResult<Vec<u8>> {
    match (first, last) {
        (Some(f), Some(l)) if !f.is_empty() && f == l => {
            let mut buf = Vec::new();
            encode_datum(&f[0], &mut buf);
            Ok(buf)
        }
        _ => Err(DbError::UnsupportedScan(meta.name.clone())),
    }
}

// ── Unique variant ───────────────────────────────────────────────────────

#[derive(Debug)]
pub struct UniqueHashIndex {
    meta: IndexMeta,
    store: Arc<Store>,
    map: Arc<StoreMap>,
    primary: Arc<PrimaryIndex>,
}

impl UniqueHashIndex {
    pub fn open(
        store: &Arc<Store>,
        id: IndexId,
        name: String,
        index_type: IndexType,
        columns: Vec<IndexColumn>,
        primary: Arc<PrimaryIndex>,
    ) -> DbResult<Self> {
        let (meta, map) = open_hash(store, id, name, index_type, columns, &primary)?;
        Ok(Self { meta, store: Arc::clone(store), map, primary })
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    fn column(&self) -> usize {
        self.meta.columns[0].column
    }

    pub fn add(&self, session: &Arc<Session>, row: &mut Row) -> DbResult<()> {
        let key = hash_key(row, self.column());
        if let Some(existing) = self.map.get(&key) {
            let existing_id = decode_row_id_value(&existing);
            if existing_id != Some(row.key) {
                if let Some(owner) = self.map.pending_owner(&key) {
                    if owner != session.transaction().id() {
                        return Err(DbError::ConcurrentUpdate(self.meta.name.clone()));
                    }
                }
                return Err(DbError::DuplicateKey {
                    index: self.meta.name.clone(),
                    key: row.get(self.column()).to_string(),
                });
            }
        }
        session
            .transaction()
            .put(&self.map, key, row.key.0.to_be_bytes().to_vec())?;
        Ok(())
    }

    pub fn remove(&self, session: &Arc<Session>, row: &Row) -> DbResult<()> {
        let key = hash_key(row, self.column());
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
        let key = probe_key(&self.meta, first, last)?;
        let Some(value) = self.map.get(&key) else {
            return Ok(Cursor::Empty);
        };
        let row_id = decode_row_id_value(&value).ok_or_else(|| {
            DbError::from(StoreError::Corrupt {
                map: self.map.name().to_string(),
                detail: "bad row id value".to_string(),
            })
        })?;
        let row = self.primary.get_row(row_id)?.ok_or_else(|| {
            DbError::internal(format!(
                "index {} references missing row {}",
                self.meta.name, row_id
            ))
        })?;
        Ok(Cursor::Rows(RowsCursor::new(session.transaction(), vec![row])))
    }

    pub fn row_count(&self, _session: &Arc<Session>) -> u64 {
        self.map.len() as u64
    }

    pub fn row_count_approx(&self) -> u64 {
        self.map.len() as u64
    }

    pub fn compare_rows(&self, a: &Row, b: &Row) -> Ordering {
        super::compare_rows_by_columns(&self.meta.columns, a, b)
    }

    pub fn drop_storage(&self, _session: &Arc<Session>) -> DbResult<()> {
        self.store.remove_map(&self.meta.map_name());
        Ok(())
    }
}

// ── Non-unique variant ───────────────────────────────────────────────────

#[derive(Debug)]
pub struct NonUniqueHashIndex {
    meta: IndexMeta,
    store: Arc<Store>,
    map: Arc<StoreMap>,
    primary: Arc<PrimaryIndex>,
}

impl NonUniqueHashIndex {
    pub fn open(
        store: &Arc<Store>,
        id: IndexId,
        name: String,
        index_type: IndexType,
        columns: Vec<IndexColumn>,
        primary: Arc<PrimaryIndex>,
    ) -> DbResult<Self> {
        let (meta, map) = open_hash(store, id, name, index_type, columns, &primary)?;
        Ok(Self { meta, store: Arc::clone(store), map, primary })
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    fn column(&self) -> usize {
        self.meta.columns[0].column
    }

    fn postings(&self, key: &[u8]) -> DbResult<Vec<i64>> {
        match self.map.get(key) {
            None => Ok(Vec::new()),
            Some(value) => bincode::deserialize(&value).map_err(|e| {
                DbError::from(StoreError::Corrupt {
                    map: self.map.name().to_string(),
                    detail: e.to_string(),
                })
            }),
        }
    }

    fn store_postings(
        &self,
        session: &Arc<Session>,
        key: Vec<u8>,
        postings: Vec<i64>,
    ) -> DbResult<()> {
        let txn = session.transaction();
        if postings.is_empty() {
            txn.remove(&self.map, &key)?;
            return Ok(());
        }
        let value = bincode::serialize(&postings)
            .map_err(|e| DbError::from(StoreError::Serialization(e.to_string())))?;
        txn.put(&self.map, key, value)?;
        Ok(())
    }

    pub fn add(&self, session: &Arc<Session>, row: &mut Row) -> DbResult<()> {
        let key = hash_key(row, self.column());
        let mut postings = self.postings(&key)?;
        postings.push(row.key.0);
        self.store_postings(session, key, postings)
    }

    pub fn remove(&self, session: &Arc<Session>, row: &Row) -> DbResult<()> {
        let key = hash_key(row, self.column());
        let mut postings = self.postings(&key)?;
        let before = postings.len();
        postings.retain(|id| *id != row.key.0);
        if postings.len() == before {
            return Err(DbError::internal(format!(
                "row {} not found when deleting from {}",
                row.key, self.meta.name
            )));
        }
        self.store_postings(session, key, postings)
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
        let key = probe_key(&self.meta, first, last)?;
        let postings = self.postings(&key)?;
        if postings.is_empty() {
            return Ok(Cursor::Empty);
        }
        let mut rows = Vec::with_capacity(postings.len());
        for id in postings {
            let row = self.primary.get_row(RowId(id))?.ok_or_else(|| {
                DbError::internal(format!(
                    "index {} references missing row {}",
                    self.meta.name, id
                ))
            })?;
            rows.push(row);
        }
        Ok(Cursor::Rows(RowsCursor::new(session.transaction(), rows)))
    }

    pub fn row_count(&self, _session: &Arc<Session>) -> u64 {
        // keys hold posting lists; count the referenced rows
        self.map
            .keys()
            .iter()
            .filter_map(|k| self.postings(k).ok())
            .map(|p| p.len() as u64)
            .sum()
    }

    pub fn row_count_approx(&self) -> u64 {
        self.map.len() as u64
    }

    pub fn compare_rows(&self, a: &Row, b: &Row) -> Ordering {
        super::compare_rows_by_columns(&self.meta.columns, a, b)
    }

    pub fn drop_storage(&self, _session: &Arc<Session>) -> DbResult<()> {
        self.store.remove_map(&self.meta.map_name());
        Ok(())
    }
}
