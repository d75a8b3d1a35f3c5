//! Delegate index: a logical index over the primary's main index column.
//! It owns no storage; every operation is served by the primary, so `add`,
//! `remove` and `truncate` are no-ops at the dispatch layer.

use std::cmp::Ordering;
use std::sync::Arc;

use kestrel_common::datum::{Datum, Row};
use kestrel_common::error::{DbError, DbResult};
use kestrel_common::schema::IndexColumn;
use kestrel_common::types::IndexId;

use crate::session::Session;

use super::cursor::Cursor;
use super::primary::PrimaryIndex;
use super::{IndexMeta, IndexType};

#[derive(Debug)]
pub struct DelegateIndex {
    meta: IndexMeta,
    primary: Arc<PrimaryIndex>,
}

impl DelegateIndex {
    pub fn new(
        id: IndexId,
        name: String,
        index_type: IndexType,
        primary: Arc<PrimaryIndex>,
    ) -> DbResult<Self> {
        let column = primary.main_index_column().ok_or_else(|| {
            DbError::internal("delegate index requires a promoted main index column")
        })?;
        let meta = IndexMeta {
            id,
            name,
            table_name: primary.meta().table_name.clone(),
            columns: vec![IndexColumn::asc(column)],
            index_type,
        };
        Ok(Self { meta, primary })
    }

    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    pub fn primary_map_name(&self) -> String {
        self.primary.meta().map_name()
    }

    pub fn find(
        &self,
        session: &Arc<Session>,
        first: Option<&[Datum]>,
        last: Option<&[Datum]>,
    ) -> DbResult<Cursor> {
        // the main column value is the row id, so the bounds carry over
        self.primary.find(session, first, last)
    }

    pub fn row_count(&self, session: &Arc<Session>) -> u64 {
        self.primary.row_count(session)
    }

    pub fn row_count_approx(&self) -> u64 {
        self.primary.row_count_approx()
    }

    pub fn compare_rows(&self, a: &Row, b: &Row) -> Ordering {
        super::compare_rows_by_columns(&self.meta.columns, a, b)
    }
}
