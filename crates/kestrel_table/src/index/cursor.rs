//! Index cursors.
//!
//! A cursor is a lazy, forward-only walk over the rows matching a search
//! range. Each `next` re-probes the backing map after the last key seen, so
//! the cursor never pins a map snapshot; it fails with `TransactionClosed`
//! if its owning transaction ended mid-iteration.

use std::sync::Arc;

use kestrel_common::datum::Row;
use kestrel_common::error::{DbError, DbResult, StoreError};
use kestrel_store::{StoreMap, Transaction};

use super::primary::PrimaryIndex;

#[derive(Debug)]
pub enum Cursor {
    /// No matching rows.
    Empty,
    /// A small materialized result (hash index probes).
    Rows(RowsCursor),
    /// Lazy range walk over the primary map.
    Primary(RangeCursor),
    /// Lazy range walk over a secondary map, fetching rows from the primary.
    Secondary(SecondaryCursor),
}

impl Cursor {
    /// Advance to the next row. Returns false when the range is exhausted.
    pub fn next(&mut self) -> DbResult<bool> {
        match self {
            Cursor::Empty => Ok(false),
            Cursor::Rows(c) => c.next(),
            Cursor::Primary(c) => c.next(),
            Cursor::Secondary(c) => c.next(),
        }
    }

    /// The row the cursor is positioned on, if any.
    pub fn get(&self) -> Option<&Row> {
        match self {
            Cursor::Empty => None,
            Cursor::Rows(c) => c.get(),
            Cursor::Primary(c) => c.current.as_ref(),
            Cursor::Secondary(c) => c.current.as_ref(),
        }
    }
}

fn ensure_open(txn: &Transaction) -> DbResult<()> {
    if txn.is_closed() {
        return Err(DbError::TransactionClosed);
    }
    Ok(())
}

#[derive(Debug)]
pub struct RowsCursor {
    txn: Arc<Transaction>,
    rows: Vec<Row>,
    pos: Option<usize>,
}

impl RowsCursor {
    pub(crate) fn new(txn: Arc<Transaction>, rows: Vec<Row>) -> Self {
        Self { txn, rows, pos: None }
    }

    fn next(&mut self) -> DbResult<bool> {
        ensure_open(&self.txn)?;
        let next = self.pos.map_or(0, |p| p + 1);
        self.pos = Some(next);
        Ok(next < self.rows.len())
    }

    fn get(&self) -> Option<&Row> {
        self.rows.get(self.pos?)
    }
}

#[derive(Debug)]
pub struct RangeCursor {
    txn: Arc<Transaction>,
    map: Arc<StoreMap>,
    lower: Vec<u8>,
    /// Inclusive upper bound on map keys.
    upper: Option<Vec<u8>>,
    last: Option<Vec<u8>>,
    pub(crate) current: Option<Row>,
}

impl RangeCursor {
    pub(crate) fn new(
        txn: Arc<Transaction>,
        map: Arc<StoreMap>,
        lower: Vec<u8>,
        upper: Option<Vec<u8>>,
    ) -> Self {
        Self { txn, map, lower, upper, last: None, current: None }
    }

    fn next(&mut self) -> DbResult<bool> {
        ensure_open(&self.txn)?;
        let probe = match &self.last {
            None => self.map.first_at_or_after(&self.lower, self.upper.as_deref()),
            Some(k) => self.map.next_after(k, self.upper.as_deref()),
        };
        match probe {
            Some((key, value)) => {
                let row: Row = bincode::deserialize(&value).map_err(|e| {
                    DbError::from(StoreError::Corrupt {
                        map: self.map.name().to_string(),
                        detail: e.to_string(),
                    })
                })?;
                self.last = Some(key);
                self.current = Some(row);
                Ok(true)
            }
            None => {
                self.current = None;
                Ok(false)
            }
        }
    }
}

#[derive(Debug)]
pub struct SecondaryCursor {
    txn: Arc<Transaction>,
    map: Arc<StoreMap>,
    primary: Arc<PrimaryIndex>,
    index_name: String,
    lower: Vec<u8>,
    upper: Option<Vec<u8>>,
    last: Option<Vec<u8>>,
    pub(crate) current: Option<Row>,
}

impl SecondaryCursor {
    pub(crate) fn new(
        txn: Arc<Transaction>,
        map: Arc<StoreMap>,
        primary: Arc<PrimaryIndex>,
        index_name: String,
        lower: Vec<u8>,
        upper: Option<Vec<u8>>,
    ) -> Self {
        Self { txn, map, primary, index_name, lower, upper, last: None, current: None }
    }

    fn next(&mut self) -> DbResult<bool> {
        ensure_open(&self.txn)?;
        let probe = match &self.last {
            None => self.map.first_at_or_after(&self.lower, self.upper.as_deref()),
            Some(k) => self.map.next_after(k, self.upper.as_deref()),
        };
        match probe {
            Some((key, value)) => {
                let row_id = super::decode_row_id_value(&value).ok_or_else(|| {
                    DbError::from(StoreError::Corrupt {
                        map: self.map.name().to_string(),
                        detail: "bad row id value".to_string(),
                    })
                })?;
                // every secondary entry must resolve against the primary
                let row = self.primary.get_row(row_id)?.ok_or_else(|| {
                    DbError::internal(format!(
                        "index {} references missing row {}",
                        self.index_name, row_id
                    ))
                })?;
                self.last = Some(key);
                self.current = Some(row);
                Ok(true)
            }
            None => {
                self.current = None;
                Ok(false)
            }
        }
    }
}
