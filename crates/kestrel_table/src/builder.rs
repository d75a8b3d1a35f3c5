//! Index construction over existing table data.
//!
//! Two strategies: the buffered builder reads the scan index into one
//! sorted in-RAM buffer and inserts in order; the block-merge builder
//! spills sorted blocks of `max_memory_rows / 2` rows into temporary maps
//! and multi-way-merges them into the target, so randomly ordered data
//! needs few random writes. Hash indexes and in-memory tables always take
//! the buffered path.

use std::sync::Arc;

use kestrel_common::datum::Row;
use kestrel_common::error::{DbError, DbResult};

use crate::index::TableIndex;
use crate::session::Session;
use crate::table::Table;

/// Populate `index` from the table's scan index. On failure the partially
/// built index is removed and its name released; the original cause is
/// re-raised.
pub(crate) fn rebuild_index(
    session: &Arc<Session>,
    table: &Arc<Table>,
    index: &Arc<TableIndex>,
) -> DbResult<()> {
    let block_merge =
        table.schema().persist_data && matches!(index.as_ref(), TableIndex::Secondary(_));
    let result = if block_merge {
        rebuild_block_merge(session, table, index)
    } else {
        rebuild_buffered(session, table, index)
    };
    if let Err(e) = result {
        table.db.schema().free_unique_name(index.name());
        if let Err(remove_err) = index.drop_storage(session) {
            tracing::error!(
                "could not remove partially built index {}: {}",
                index.name(),
                remove_err
            );
        }
        return Err(e);
    }
    Ok(())
}

fn rebuild_buffered(
    session: &Arc<Session>,
    table: &Arc<Table>,
    index: &Arc<TableIndex>,
) -> DbResult<()> {
    let scan = table.get_scan_index()?;
    let total = scan.row_count(session);
    let mut remaining = total as i64;
    let mut cursor = scan.find(session, None, None)?;
    let buffer_size = total.min(table.db.settings().max_memory_rows as u64).max(1) as usize;
    let mut buffer: Vec<Row> = Vec::with_capacity(buffer_size);
    let target = format!("{}:{}", table.name(), index.name());
    let mut current = 0u64;
    while cursor.next()? {
        let Some(row) = cursor.get() else { break };
        buffer.push(row.clone());
        table.db.report_progress(&target, current, total);
        current += 1;
        if buffer.len() >= buffer_size {
            add_rows_to_index(session, &mut buffer, index)?;
        }
        remaining -= 1;
    }
    add_rows_to_index(session, &mut buffer, index)?;
    if remaining != 0 {
        return Err(DbError::internal(format!(
            "row count remaining={} building {}",
            remaining, target
        )));
    }
    Ok(())
}

fn rebuild_block_merge(
    session: &Arc<Session>,
    table: &Arc<Table>,
    index: &Arc<TableIndex>,
) -> DbResult<()> {
    let mut block_names: Vec<String> = Vec::new();
    let result = block_merge_inner(session, table, index, &mut block_names);
    if result.is_err() {
        // blocks spilled before the failure; the merge removes its own
        for name in &block_names {
            table.db.store().remove_map(name);
        }
    }
    result
}

fn block_merge_inner(
    session: &Arc<Session>,
    table: &Arc<Table>,
    index: &Arc<TableIndex>,
    block_names: &mut Vec<String>,
) -> DbResult<()> {
    let TableIndex::Secondary(secondary) = index.as_ref() else {
        return Err(DbError::internal(
            "block-merge build requires a sorted secondary index",
        ));
    };
    let store = table.db.store();
    let scan = table.get_scan_index()?;
    let total = scan.row_count(session);
    let mut remaining = total as i64;
    let mut cursor = scan.find(session, None, None)?;
    let buffer_size = (table.db.settings().max_memory_rows / 2).max(1);
    let mut buffer: Vec<Row> = Vec::with_capacity(buffer_size);
    let target = format!("{}:{}", table.name(), index.name());
    let mut current = 0u64;
    while cursor.next()? {
        let Some(row) = cursor.get() else { break };
        buffer.push(row.clone());
        table.db.report_progress(&target, current, total);
        current += 1;
        if buffer.len() >= buffer_size {
            sort_rows(&mut buffer, index);
            let name = store.next_temporary_map_name();
            secondary.add_rows_to_buffer(&buffer, &name)?;
            block_names.push(name);
            buffer.clear();
        }
        remaining -= 1;
    }
    sort_rows(&mut buffer, index);
    if block_names.is_empty() {
        // everything fit in one buffer; no merge needed
        add_rows_to_index(session, &mut buffer, index)?;
    } else {
        let name = store.next_temporary_map_name();
        secondary.add_rows_to_buffer(&buffer, &name)?;
        block_names.push(name);
        buffer.clear();
        secondary.add_buffered_rows(session, std::mem::take(block_names))?;
    }
    if remaining != 0 {
        return Err(DbError::internal(format!(
            "row count remaining={} building {}",
            remaining, target
        )));
    }
    Ok(())
}

fn add_rows_to_index(
    session: &Arc<Session>,
    buffer: &mut Vec<Row>,
    index: &Arc<TableIndex>,
) -> DbResult<()> {
    sort_rows(buffer, index);
    for mut row in buffer.drain(..) {
        index.add(session, &mut row)?;
    }
    Ok(())
}

fn sort_rows(rows: &mut [Row], index: &TableIndex) {
    rows.sort_by(|a, b| index.compare_rows(a, b));
}
