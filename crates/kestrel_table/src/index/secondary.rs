//! Persistent sorted secondary index.
//!
//! Entries live in an ordered map as `encoded index columns ++ encoded row
//! id → row id`. The row-id suffix keeps duplicate index keys distinct;
//! the value repeats the row id so cursors can resolve rows without
//! parsing the key. Composite order is the lexicographic combination of
//! the per-column sort orders (descending columns are byte-complemented in
//! the encoding).

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;

use kestrel_common::datum::{encode_datum_ordered, encode_row_id, Datum, Row};
use kestrel_common::error::{DbError, DbResult};
use kestrel_common::schema::{IndexColumn, SortOrder};
use kestrel_common::types::IndexId;
use kestrel_store::map::upper_bound_exclusive;
use kestrel_store::{Store, StoreMap};

use crate::session::Session;

use super::cursor::{Cursor, SecondaryCursor};
use super::primary::PrimaryIndex;
use super::{decode_row_id_value, IndexMeta, IndexType};

/// Encoded width of the row-id suffix at the end of every entry key.
const ROW_ID_SUFFIX: usize = 9;

#[derive(Debug)]
pub struct SecondaryIndex {
    meta: IndexMeta,
    store: Arc<Store>,
    map: Arc<StoreMap>,
    primary: Arc<PrimaryIndex>,
}

impl SecondaryIndex {
    pub fn open(
        store: &Arc<Store>,
        id: IndexId,
        name: String,
        index_type: IndexType,
        columns: Vec<IndexColumn>,
        primary: Arc<PrimaryIndex>,
    ) -> DbResult<Self> {
        let meta = IndexMeta {
            id,
            name,
            table_name: primary.meta().table_name.clone(),
            columns,
            index_type,
        };
        let map = store.open_map(&meta.map_name())?;
        Ok(Self { meta, store: Arc::clone(store), map, primary })
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    /// Full entry key for a row: encoded columns plus the row-id suffix.
    fn entry_key(&self, row: &Row) -> Vec<u8> {
        let mut buf = Vec::new();
        for col in &self.meta.columns {
            encode_datum_ordered(row.get(col.column), col.sort, &mut buf);
        }
        encode_row_id(row.key, &mut buf);
        buf
    }

    /// Encoded column prefix for a (possibly partial) search key.
    fn column_prefix(&self, values: &[Datum]) -> Vec<u8> {
        let mut buf = Vec::new();
        for (col, value) in self.meta.columns.iter().zip(values) {
            encode_datum_ordered(value, col.sort, &mut buf);
        }
        buf
    }

    fn row_has_null_key(&self, row: &Row) -> bool {
        self.meta.columns.iter().any(|c| row.get(c.column).is_null())
    }

    pub fn add(&self, session: &Arc<Session>, row: &mut Row) -> DbResult<()> {
        // unique enforcement skips keys containing NULL, matching the
        // engine's multiple-NULLs-allowed policy
        if self.meta.index_type.unique && !self.row_has_null_key(row) {
            let values: Vec<Datum> =
                self.meta.columns.iter().map(|c| row.get(c.column).clone()).collect();
            let prefix = self.column_prefix(&values);
            let upper = upper_bound_exclusive(&prefix);
            let mut probe = self.map.first_at_or_after(&prefix, upper.as_deref());
            while let Some((key, value)) = probe {
                if decode_row_id_value(&value) != Some(row.key) {
                    return Err(self.conflict_error(session, &key, &values));
                }
                probe = self.map.next_after(&key, upper.as_deref());
            }
        }
        let key = self.entry_key(row);
        session
            .transaction()
            .put(&self.map, key, row.key.0.to_be_bytes().to_vec())?;
        Ok(())
    }

    /// A conflicting entry still pending in another session's transaction
    /// is a concurrent update; a committed one is a duplicate key.
    fn conflict_error(&self, session: &Arc<Session>, entry_key: &[u8], values: &[Datum]) -> DbError {
        if let Some(owner) = self.map.pending_owner(entry_key) {
            if owner != session.transaction().id() {
                return DbError::ConcurrentUpdate(self.meta.name.clone());
            }
        }
        let key = values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
        DbError::DuplicateKey { index: self.meta.name.clone(), key }
    }

    pub fn remove(&self, session: &Arc<Session>, row: &Row) -> DbResult<()> {
        let key = self.entry_key(row);
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
        let lower = first.map_or_else(Vec::new, |f| self.column_prefix(f));
        let upper = last.and_then(|l| upper_bound_exclusive(&self.column_prefix(l)));
        Ok(Cursor::Secondary(SecondaryCursor::new(
            session.transaction(),
            Arc::clone(&self.map),
            Arc::clone(&self.primary),
            self.meta.name.clone(),
            lower,
            upper,
        )))
    }

    pub fn row_count(&self, _session: &Arc<Session>) -> u64 {
        self.map.len() as u64
    }

    pub fn row_count_approx(&self) -> u64 {
        self.map.len() as u64
    }

    /// A freshly created secondary over existing data has an empty map and
    /// must be populated by the builder.
    pub fn needs_rebuild(&self) -> bool {
        self.map.is_empty()
    }

    pub fn compare_rows(&self, a: &Row, b: &Row) -> Ordering {
        super::compare_rows_by_columns(&self.meta.columns, a, b)
    }

    pub fn drop_storage(&self, _session: &Arc<Session>) -> DbResult<()> {
        self.store.remove_map(&self.meta.map_name());
        Ok(())
    }

    pub fn disk_space_used(&self) -> u64 {
        self.map.bytes_used()
    }

    // ── Bulk build ───────────────────────────────────────────────────

    /// Write a sorted block of rows into a temporary map. Builder scratch
    /// space is outside the transaction: the maps are dropped wholesale
    /// after the merge.
    pub(crate) fn add_rows_to_buffer(&self, rows: &[Row], map_name: &str) -> DbResult<()> {
        let buffer = self.store.open_map(map_name)?;
        for row in rows {
            buffer.insert(self.entry_key(row), row.key.0.to_be_bytes().to_vec());
        }
        tracing::debug!(
            "index {}: spilled {} rows to {}",
            self.meta.name,
            rows.len(),
            map_name
        );
        Ok(())
    }

    /// Multi-way merge of the temporary maps into the index map. Duplicate
    /// keys are detected during the merge so unique violations surface
    /// before the build finishes. The temporary maps are removed on every
    /// path out.
    pub(crate) fn add_buffered_rows(
        &self,
        session: &Arc<Session>,
        buffer_names: Vec<String>,
    ) -> DbResult<()> {
        let result = self.merge_buffers(session, &buffer_names);
        for name in &buffer_names {
            self.store.remove_map(name);
        }
        result
    }

    fn merge_buffers(&self, session: &Arc<Session>, buffer_names: &[String]) -> DbResult<()> {
        let sources: Vec<Arc<StoreMap>> = buffer_names
            .iter()
            .map(|name| self.store.open_map(name))
            .collect::<Result<_, _>>()?;

        // seed the heap with each source's first entry; Reverse turns the
        // max-heap into the k-way minimum merge
        let mut heap: BinaryHeap<Reverse<(Vec<u8>, Vec<u8>, usize)>> = BinaryHeap::new();
        for (i, source) in sources.iter().enumerate() {
            if let Some((key, value)) = source.first_at_or_after(&[], None) {
                heap.push(Reverse((key, value, i)));
            }
        }

        let txn = session.transaction();
        let check_unique = self.meta.index_type.unique;
        let mut previous_prefix: Option<Vec<u8>> = None;
        let mut merged = 0u64;
        while let Some(Reverse((key, value, source_idx))) = heap.pop() {
            if check_unique && key.len() >= ROW_ID_SUFFIX {
                let prefix = &key[..key.len() - ROW_ID_SUFFIX];
                if previous_prefix.as_deref() == Some(prefix)
                    && !self.prefix_has_null(prefix)
                {
                    return Err(DbError::DuplicateKey {
                        index: self.meta.name.clone(),
                        key: "<merged block>".to_string(),
                    });
                }
                previous_prefix = Some(prefix.to_vec());
            }
            txn.put(&self.map, key.clone(), value)?;
            merged += 1;
            if let Some(next) = sources[source_idx].next_after(&key, None) {
                heap.push(Reverse((next.0, next.1, source_idx)));
            }
        }
        tracing::debug!(
            "index {}: merged {} rows from {} blocks",
            self.meta.name,
            merged,
            sources.len()
        );
        Ok(())
    }

    /// True when any encoded column in `prefix` is NULL. Walks the prefix
    /// datum by datum; descending columns are byte-complemented.
    fn prefix_has_null(&self, prefix: &[u8]) -> bool {
        let mut pos = 0;
        for col in &self.meta.columns {
            if pos >= prefix.len() {
                return false;
            }
            let raw_tag = prefix[pos];
            let tag = match col.sort {
                SortOrder::Ascending => raw_tag,
                SortOrder::Descending => !raw_tag,
            };
            if tag == 0x00 {
                return true;
            }
            pos += 1;
            pos += match tag {
                0x01 => 1,
                0x02 | 0x03 | 0x05 => 8,
                0x06 => 4,
                // NUL-terminated text / bytea (terminator complemented
                // under descending order)
                0x04 | 0x07 => {
                    let terminator = match col.sort {
                        SortOrder::Ascending => 0x00,
                        SortOrder::Descending => 0xFF,
                    };
                    match prefix[pos..].iter().position(|b| *b == terminator) {
                        Some(i) => i + 1,
                        None => return false,
                    }
                }
                _ => return false,
            };
        }
        false
    }
}
