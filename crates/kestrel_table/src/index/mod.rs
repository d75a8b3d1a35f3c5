//! Physical indexes.
//!
//! Every index of a table is one variant of [`TableIndex`]; the table routes
//! mutations through the whole set and range queries through whichever
//! variant the planner picked. Variants:
//!
//! - [`PrimaryIndex`] — clustered `row id → row`, the scan source.
//! - [`DelegateIndex`] — covering view over the primary's main index column,
//!   owns no storage.
//! - [`UniqueHashIndex`] / [`NonUniqueHashIndex`] — in-memory equality-only.
//! - [`SecondaryIndex`] — persistent ordered `index key → row id`.

mod cursor;
mod delegate;
mod hash;
mod primary;
mod secondary;

use std::cmp::Ordering;
use std::sync::Arc;

pub use cursor::Cursor;
pub use delegate::DelegateIndex;
pub use hash::{NonUniqueHashIndex, UniqueHashIndex};
pub use primary::PrimaryIndex;
pub use secondary::SecondaryIndex;

use kestrel_common::datum::{Datum, Row};
use kestrel_common::error::DbResult;
use kestrel_common::schema::IndexColumn;
use kestrel_common::types::IndexId;

use crate::session::Session;

/// Index kind flags, fixed at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexType {
    pub primary_key: bool,
    pub unique: bool,
    pub hash: bool,
    pub scan: bool,
}

impl IndexType {
    /// The clustered scan index backing the table itself.
    pub fn scan() -> Self {
        Self { primary_key: true, unique: true, hash: false, scan: true }
    }

    pub fn primary_key(hash: bool) -> Self {
        Self { primary_key: true, unique: true, hash, scan: false }
    }

    pub fn unique(hash: bool) -> Self {
        Self { primary_key: false, unique: true, hash, scan: false }
    }

    pub fn non_unique(hash: bool) -> Self {
        Self { primary_key: false, unique: false, hash, scan: false }
    }
}

/// Identity and definition shared by all index variants.
#[derive(Debug, Clone)]
pub struct IndexMeta {
    pub id: IndexId,
    pub name: String,
    pub table_name: String,
    pub columns: Vec<IndexColumn>,
    pub index_type: IndexType,
}

impl IndexMeta {
    /// Backing map name convention: `index.<id>`.
    pub fn map_name(&self) -> String {
        format!("index.{}", self.id.0)
    }
}

/// A physical index. Tagged variant rather than trait objects: the set of
/// implementations is closed and the table dispatches by shape in several
/// places (builder strategy, delegate selection).
#[derive(Debug)]
pub enum TableIndex {
    Primary(Arc<PrimaryIndex>),
    Delegate(DelegateIndex),
    HashUnique(UniqueHashIndex),
    HashNonUnique(NonUniqueHashIndex),
    Secondary(SecondaryIndex),
}

impl TableIndex {
    pub fn meta(&self) -> &IndexMeta {
        match self {
            TableIndex::Primary(i) => i.meta(),
            TableIndex::Delegate(i) => i.meta(),
            TableIndex::HashUnique(i) => i.meta(),
            TableIndex::HashNonUnique(i) => i.meta(),
            TableIndex::Secondary(i) => i.meta(),
        }
    }

    pub fn id(&self) -> IndexId {
        self.meta().id
    }

    pub fn name(&self) -> &str {
        &self.meta().name
    }

    /// Insert `row` into this index. The primary index assigns the row id;
    /// every other variant requires it to be set already.
    pub fn add(&self, session: &Arc<Session>, row: &mut Row) -> DbResult<()> {
        match self {
            TableIndex::Primary(i) => i.add(session, row),
            TableIndex::Delegate(_) => Ok(()),
            TableIndex::HashUnique(i) => i.add(session, row),
            TableIndex::HashNonUnique(i) => i.add(session, row),
            TableIndex::Secondary(i) => i.add(session, row),
        }
    }

    pub fn remove(&self, session: &Arc<Session>, row: &Row) -> DbResult<()> {
        match self {
            TableIndex::Primary(i) => i.remove(session, row),
            TableIndex::Delegate(_) => Ok(()),
            TableIndex::HashUnique(i) => i.remove(session, row),
            TableIndex::HashNonUnique(i) => i.remove(session, row),
            TableIndex::Secondary(i) => i.remove(session, row),
        }
    }

    pub fn truncate(&self, session: &Arc<Session>) -> DbResult<()> {
        match self {
            TableIndex::Primary(i) => i.truncate(session),
            TableIndex::Delegate(_) => Ok(()),
            TableIndex::HashUnique(i) => i.truncate(session),
            TableIndex::HashNonUnique(i) => i.truncate(session),
            TableIndex::Secondary(i) => i.truncate(session),
        }
    }

    /// Range scan over `[first, last]` on the index's key columns. Both
    /// bounds are optional and inclusive; hash variants only support
    /// equality probes (`first == last`, both set).
    pub fn find(
        &self,
        session: &Arc<Session>,
        first: Option<&[Datum]>,
        last: Option<&[Datum]>,
    ) -> DbResult<Cursor> {
        match self {
            TableIndex::Primary(i) => i.find(session, first, last),
            TableIndex::Delegate(i) => i.find(session, first, last),
            TableIndex::HashUnique(i) => i.find(session, first, last),
            TableIndex::HashNonUnique(i) => i.find(session, first, last),
            TableIndex::Secondary(i) => i.find(session, first, last),
        }
    }

    pub fn row_count(&self, session: &Arc<Session>) -> u64 {
        match self {
            TableIndex::Primary(i) => i.row_count(session),
            TableIndex::Delegate(i) => i.row_count(session),
            TableIndex::HashUnique(i) => i.row_count(session),
            TableIndex::HashNonUnique(i) => i.row_count(session),
            TableIndex::Secondary(i) => i.row_count(session),
        }
    }

    pub fn row_count_approx(&self) -> u64 {
        match self {
            TableIndex::Primary(i) => i.row_count_approx(),
            TableIndex::Delegate(i) => i.row_count_approx(),
            TableIndex::HashUnique(i) => i.row_count_approx(),
            TableIndex::HashNonUnique(i) => i.row_count_approx(),
            TableIndex::Secondary(i) => i.row_count_approx(),
        }
    }

    /// True when the index was created over existing data and must be
    /// populated by the index builder before it is usable.
    pub fn needs_rebuild(&self) -> bool {
        match self {
            TableIndex::Primary(_) | TableIndex::Delegate(_) => false,
            TableIndex::HashUnique(_) | TableIndex::HashNonUnique(_) => true,
            TableIndex::Secondary(i) => i.needs_rebuild(),
        }
    }

    /// Total order over the index's key columns, used to sort build buffers.
    pub fn compare_rows(&self, a: &Row, b: &Row) -> Ordering {
        match self {
            TableIndex::Primary(i) => i.compare_rows(a, b),
            TableIndex::Delegate(i) => i.compare_rows(a, b),
            TableIndex::HashUnique(i) => i.compare_rows(a, b),
            TableIndex::HashNonUnique(i) => i.compare_rows(a, b),
            TableIndex::Secondary(i) => i.compare_rows(a, b),
        }
    }

    /// Name of the backing map, if the variant has (or aliases) one.
    pub fn map_name(&self) -> Option<String> {
        match self {
            TableIndex::Primary(i) => Some(i.meta().map_name()),
            TableIndex::Delegate(i) => Some(i.primary_map_name()),
            TableIndex::HashUnique(i) => Some(i.meta().map_name()),
            TableIndex::HashNonUnique(i) => Some(i.meta().map_name()),
            TableIndex::Secondary(i) => Some(i.meta().map_name()),
        }
    }

    /// Drop the index's backing storage. Used when the index itself is
    /// dropped or when a partially built index is cleaned up.
    pub fn drop_storage(&self, session: &Arc<Session>) -> DbResult<()> {
        match self {
            TableIndex::Primary(i) => i.drop_storage(session),
            TableIndex::Delegate(_) => Ok(()),
            TableIndex::HashUnique(i) => i.drop_storage(session),
            TableIndex::HashNonUnique(i) => i.drop_storage(session),
            TableIndex::Secondary(i) => i.drop_storage(session),
        }
    }

    pub fn disk_space_used(&self) -> u64 {
        match self {
            TableIndex::Primary(i) => i.disk_space_used(),
            TableIndex::Delegate(_) => 0,
            TableIndex::HashUnique(_) | TableIndex::HashNonUnique(_) => 0,
            TableIndex::Secondary(i) => i.disk_space_used(),
        }
    }
}

/// Decode the 8-byte big-endian row id stored as the value of hash and
/// secondary index entries.
pub(crate) fn decode_row_id_value(value: &[u8]) -> Option<kestrel_common::types::RowId> {
    let bytes: [u8; 8] = value.try_into().ok()?;
    Some(kestrel_common::types::RowId(i64::from_be_bytes(bytes)))
}

/// Compare two rows column by column under the index column order, the way
/// every non-primary variant sorts.
pub(crate) fn compare_rows_by_columns(columns: &[IndexColumn], a: &Row, b: &Row) -> Ordering {
    for col in columns {
        let cmp = a.get(col.column).cmp_total(b.get(col.column));
        let cmp = match col.sort {
            kestrel_common::schema::SortOrder::Ascending => cmp,
            kestrel_common::schema::SortOrder::Descending => cmp.reverse(),
        };
        if cmp != Ordering::Equal {
            return cmp;
        }
    }
    Ordering::Equal
}
